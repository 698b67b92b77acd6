mod event;
mod query;

pub use event::{NewTimelineEvent, TimelineEvent, TimelineEventType};
pub use query::TimelineQuery;
