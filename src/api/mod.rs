pub mod envelope;
pub mod rest;
