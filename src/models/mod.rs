pub mod audit;
pub mod booking;
pub mod fare;
pub mod offer;
pub mod rating;
pub mod request;
pub mod routing;
pub mod status;
pub mod user;
