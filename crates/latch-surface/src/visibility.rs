//! The "current declared visibility" of a type body.
//!
//! Declarations made while the tracker reads `Private` default to private
//! accessors, exactly as if each had passed the visibility explicitly.

use latch_kernel::Visibility;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisibilityTracker {
    current: Visibility,
}

impl VisibilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn public(&mut self) {
        self.current = Visibility::Public;
    }

    pub fn protected(&mut self) {
        self.current = Visibility::Protected;
    }

    pub fn private(&mut self) {
        self.current = Visibility::Private;
    }

    pub fn current(&self) -> Visibility {
        self.current
    }

    /// Set the level, returning the previous one.
    pub fn replace(&mut self, visibility: Visibility) -> Visibility {
        std::mem::replace(&mut self.current, visibility)
    }

    /// Run `f` at `visibility`, then restore the previous level.
    pub fn with<R>(&mut self, visibility: Visibility, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.replace(visibility);
        let out = f(self);
        self.current = previous;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_public_and_follows_statements() {
        let mut tracker = VisibilityTracker::new();
        assert_eq!(tracker.current(), Visibility::Public);
        tracker.private();
        assert_eq!(tracker.current(), Visibility::Private);
        tracker.protected();
        assert_eq!(tracker.current(), Visibility::Protected);
        tracker.public();
        assert_eq!(tracker.current(), Visibility::Public);
    }

    #[test]
    fn scoped_level_is_restored() {
        let mut tracker = VisibilityTracker::new();
        tracker.protected();
        let inner = tracker.with(Visibility::Private, |t| {
            t.public();
            t.current()
        });
        assert_eq!(inner, Visibility::Public);
        assert_eq!(tracker.current(), Visibility::Protected);
    }
}
