mod job;
mod post;
mod report;
mod summary;

pub use job::SummarizationJob;
pub use post::{NewPost, Post};
pub use report::{NewReport, PeriodType, Report, ReportStatus, TagStat};
pub use summary::{GeneratedSummary, SummarySource, SummaryStatus};
