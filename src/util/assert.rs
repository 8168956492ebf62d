/// Panic with a Firebase-styled internal assertion message when the condition is false.
///
/// Invariant violations in the synchronization core (out-of-order write ids,
/// removing unknown writes) indicate the surrounding engine is inconsistent
/// and are not recoverable.
pub fn assert(condition: bool, message: impl AsRef<str>) {
    if !condition {
        panic!("{}", assertion_error(message));
    }
}

/// Build the string used when raising assertion errors to keep parity with the
/// other SDK implementations.
pub fn assertion_error(message: impl AsRef<str>) -> String {
    format!(
        "Firebase ({}) INTERNAL ASSERT FAILED: {}",
        env!("CARGO_PKG_VERSION"),
        message.as_ref()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "INTERNAL ASSERT FAILED")]
    fn assert_panics_on_false() {
        assert(false, "should panic");
    }

    #[test]
    fn assert_passes_on_true() {
        assert(true, "should not panic");
    }

    #[test]
    fn assertion_error_formats_message() {
        let err = assertion_error("boom");
        assert!(err.contains("Firebase"));
        assert!(err.contains("boom"));
    }
}
