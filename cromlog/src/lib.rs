pub mod aws;
pub mod cromwell;
pub mod inspect;
pub mod report;
