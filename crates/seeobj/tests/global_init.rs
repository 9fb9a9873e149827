//! The process-wide runtime.
//!
//! One test only: the global state is shared by every test in a binary.

mod common;

use seeobj::{Error, RuntimeConfig};
use std::sync::Arc;

#[test]
fn test_counted_init_and_deinit() {
    common::init_tracing();

    assert_eq!(seeobj::runtime().unwrap_err(), Error::NotInitialized);

    let first = seeobj::init_with(RuntimeConfig::new().with_registry_capacity(4)).unwrap();
    let second = seeobj::init().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    // The configuration of the creating call sticks.
    assert_eq!(second.config().registry_capacity, 4);

    let current = seeobj::runtime().unwrap();
    assert!(Arc::ptr_eq(&first, &current));

    seeobj::deinit();
    assert!(seeobj::runtime().is_ok());

    seeobj::deinit();
    assert_eq!(seeobj::runtime().unwrap_err(), Error::NotInitialized);

    // Unbalanced deinit is ignored.
    seeobj::deinit();

    let fresh = seeobj::init().unwrap();
    assert!(!Arc::ptr_eq(&first, &fresh));
    assert_eq!(fresh.config().registry_capacity, 64);
    seeobj::deinit();
}
