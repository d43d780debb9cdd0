pub mod accounts;
pub mod credentials;
pub mod unit_of_work;
