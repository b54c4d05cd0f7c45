//! Integration tests for syncbot-drive
//!
//! Uses wiremock to simulate the Google token endpoint and the Drive v3 API.

mod common;

mod test_drive;
mod test_oauth;
