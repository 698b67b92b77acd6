//! Typed employment history extracted from `/employments` payloads.
//!
//! Upstream documents are loosely shaped: the same concept shows up under
//! several key spellings, numbers arrive as strings, and the arrays may sit
//! at the top level or inside a list of employments. Everything here reads
//! the document defensively and reports what it had to skip.

mod extract;
mod period;

pub use extract::{payload_start_date, read_date, read_number, read_string};
pub use period::{sort_by_start, ContractPeriod, EmploymentHistory, HoursPeriod, Period, SalaryPeriod};
