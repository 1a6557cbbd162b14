//! Explicit, priority-ordered isolator registry.
//!
//! Isolators are registered once at startup with a priority. Higher
//! priorities run earlier during setup and later during teardown; equal
//! priorities keep registration order. Duplicate tags are rejected.

use crate::error::RegistryError;
use crate::isolator::Isolator;

/// Priority of the initial-state isolator, which settles the queue before
/// the database snapshot is taken.
pub const INITIAL_STATE_PRIORITY: i32 = 100;

/// Priority of the database snapshot isolators.
pub const DATABASE_PRIORITY: i32 = 50;

/// Priority of the message-queue drain isolator.
pub const MESSAGE_QUEUE_PRIORITY: i32 = 10;

/// An isolator together with its registration metadata.
pub struct RegisteredIsolator {
    priority: i32,
    tag: String,
    isolator: Box<dyn Isolator>,
}

impl RegisteredIsolator {
    /// Declared priority.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Tag captured at registration.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Human-readable isolator name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.isolator.name()
    }

    pub(crate) fn isolator_mut(&mut self) -> &mut dyn Isolator {
        self.isolator.as_mut()
    }

    pub(crate) fn isolator(&self) -> &dyn Isolator {
        self.isolator.as_ref()
    }
}

impl std::fmt::Debug for RegisteredIsolator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredIsolator")
            .field("priority", &self.priority)
            .field("tag", &self.tag)
            .field("name", &self.isolator.name())
            .finish()
    }
}

/// Ordered collection of isolators.
#[derive(Debug, Default)]
pub struct IsolatorRegistry {
    entries: Vec<RegisteredIsolator>,
}

impl IsolatorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `isolator` at `priority`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTag`] when another isolator already
    /// uses the same tag, or [`RegistryError::EmptyTag`] when the tag is
    /// blank.
    pub fn register(
        &mut self,
        priority: i32,
        isolator: Box<dyn Isolator>,
    ) -> Result<(), RegistryError> {
        let tag = isolator.tag();
        if tag.is_empty() {
            return Err(RegistryError::EmptyTag {
                name: isolator.name().to_owned(),
            });
        }
        if let Some(existing) = self.entries.iter().find(|entry| entry.tag == tag) {
            return Err(RegistryError::DuplicateTag {
                tag,
                existing: existing.name().to_owned(),
            });
        }

        // Insert after every entry with an equal or higher priority so the
        // vector stays sorted and equal priorities keep registration order.
        let position = self
            .entries
            .iter()
            .position(|entry| entry.priority < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            position,
            RegisteredIsolator {
                priority,
                tag,
                isolator,
            },
        );
        Ok(())
    }

    /// Looks up an isolator by tag.
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<&RegisteredIsolator> {
        self.entries.iter().find(|entry| entry.tag == tag)
    }

    /// Tags in setup order.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        self.entries.iter().map(RegisteredIsolator::tag).collect()
    }

    /// Number of registered isolators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether no isolators are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the registry, yielding entries in setup order.
    #[must_use]
    pub fn into_entries(self) -> Vec<RegisteredIsolator> {
        self.entries
    }
}
