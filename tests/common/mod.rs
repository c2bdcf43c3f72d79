#![allow(dead_code)]

pub mod app;
pub mod capture;
pub mod http;
