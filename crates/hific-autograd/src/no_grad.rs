//! No-Grad Context - Disable Gradient Computation
//!
//! Thread-local switch that stops operations from recording backward nodes.
//! Used for evaluation-only passes where no parameter should learn.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::cell::Cell;

// =============================================================================
// Thread-Local Gradient State
// =============================================================================

thread_local! {
    /// Whether gradient computation is enabled for this thread.
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Returns whether gradient computation is currently enabled.
#[must_use]
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

fn set_grad_enabled(enabled: bool) {
    GRAD_ENABLED.with(|g| g.set(enabled));
}

// =============================================================================
// NoGradGuard
// =============================================================================

/// RAII guard that disables gradient computation within its scope.
///
/// Dropping the guard restores the state observed at construction, so
/// guards nest.
///
/// ```rust,ignore
/// use hific_autograd::NoGradGuard;
///
/// {
///     let _guard = NoGradGuard::new();
///     let y = x.tanh(); // not recorded
/// }
/// ```
pub struct NoGradGuard {
    prev_state: bool,
}

impl NoGradGuard {
    /// Creates a new `NoGradGuard`, disabling gradient computation.
    #[must_use]
    pub fn new() -> Self {
        let prev_state = is_grad_enabled();
        set_grad_enabled(false);
        Self { prev_state }
    }
}

impl Drop for NoGradGuard {
    fn drop(&mut self) {
        set_grad_enabled(self.prev_state);
    }
}

impl Default for NoGradGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Executes a closure with gradient computation disabled.
pub fn no_grad<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = NoGradGuard::new();
    f()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_grad_guard() {
        assert!(is_grad_enabled());
        {
            let _guard = NoGradGuard::new();
            assert!(!is_grad_enabled());
        }
        assert!(is_grad_enabled());
    }

    #[test]
    fn test_nested_guards() {
        {
            let _outer = NoGradGuard::new();
            {
                let _inner = NoGradGuard::new();
                assert!(!is_grad_enabled());
            }
            assert!(!is_grad_enabled());
        }
        assert!(is_grad_enabled());
    }

    #[test]
    fn test_no_grad_closure() {
        let inside = no_grad(is_grad_enabled);
        assert!(!inside);
        assert!(is_grad_enabled());
    }
}
