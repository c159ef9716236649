#[path = "../../src/fake_worker.rs"]
mod fake_worker;

mod common;
mod data_channels;
mod lifecycle;
mod scenarios;
