pub mod audit;
pub mod event;
pub mod location;
pub mod matching;
pub mod request;
