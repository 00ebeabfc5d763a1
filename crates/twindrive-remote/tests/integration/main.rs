//! Integration tests for twindrive-remote
//!
//! Uses wiremock to simulate the drive API and verifies end-to-end
//! behavior of folder listing, folder creation, uploads, and downloads.

mod common;

mod test_folder_operations;
mod test_transfers;
