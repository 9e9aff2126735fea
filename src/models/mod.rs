//! Data models for the school library

pub mod book;
pub mod comment;
pub mod loan;
pub mod notification;
pub mod stats;
pub mod waitlist;

// Re-export commonly used types
pub use book::{Book, BookSummary};
pub use comment::Comment;
pub use loan::{Loan, LoanDetails, LoanStatus};
pub use notification::Notification;
pub use waitlist::WaitlistEntry;
