pub mod checkin;
pub mod comparison;
pub mod report;
