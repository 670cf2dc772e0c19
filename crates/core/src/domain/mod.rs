pub mod activation;
pub mod catalog;
pub mod instance;
pub mod subject;
