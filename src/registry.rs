use std::{collections::HashSet, fmt, sync::Arc};

use tracing::{debug, info};

use crate::{
    backend::ChatBackend,
    config::{ConfigError, TimeoutPolicy},
    models::ServiceStatus,
};

#[derive(Clone)]
pub struct BackendDescriptor {
    name: String,
    priority: u32,
    backend: Arc<dyn ChatBackend>,
}

impl BackendDescriptor {
    pub fn new(priority: u32, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            name: backend.name().to_owned(),
            priority,
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }
}

impl fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Static, priority-ordered set of backends. Availability is asked of each
/// backend on every call and never cached.
#[derive(Debug)]
pub struct BackendRegistry {
    descriptors: Vec<BackendDescriptor>,
}

impl BackendRegistry {
    pub fn new(
        mut descriptors: Vec<BackendDescriptor>,
        timeouts: &TimeoutPolicy,
    ) -> Result<Self, ConfigError> {
        descriptors.sort_by_key(BackendDescriptor::priority);

        for pair in descriptors.windows(2) {
            if pair[0].priority == pair[1].priority {
                return Err(ConfigError::DuplicatePriority {
                    first: pair[0].name.clone(),
                    second: pair[1].name.clone(),
                    priority: pair[0].priority,
                });
            }
        }

        let mut seen = HashSet::new();
        for descriptor in &descriptors {
            if descriptor.name.trim().is_empty() {
                return Err(ConfigError::EmptyName);
            }
            if !seen.insert(descriptor.name.to_lowercase()) {
                return Err(ConfigError::DuplicateName(descriptor.name.clone()));
            }
        }

        timeouts.validate(descriptors.iter().map(BackendDescriptor::name))?;
        Ok(Self { descriptors })
    }

    pub fn descriptors(&self) -> &[BackendDescriptor] {
        &self.descriptors
    }

    pub fn list_available(&self) -> Vec<BackendDescriptor> {
        self.descriptors
            .iter()
            .filter(|descriptor| descriptor.is_available())
            .cloned()
            .collect()
    }

    /// Case-insensitive lookup over every configured backend.
    pub fn resolve_explicit(&self, name: &str) -> Option<&BackendDescriptor> {
        let name = name.trim();
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.name.eq_ignore_ascii_case(name))
    }

    /// The single preferred backend when it is known and available, else the
    /// full availability-filtered order. `auto` means no preference.
    pub fn candidates(&self, preferred: Option<&str>) -> Vec<BackendDescriptor> {
        let available = self.list_available();
        let Some(preferred) = preferred
            .map(str::trim)
            .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case("auto"))
        else {
            return available;
        };

        match self.resolve_explicit(preferred) {
            Some(descriptor) => {
                if let Some(found) = available
                    .iter()
                    .find(|candidate| candidate.name == descriptor.name)
                {
                    debug!(preferred = %found.name, "using preferred service");
                    return vec![found.clone()];
                }
                info!(preferred = %preferred, "preferred service not available, using fallback order");
            }
            None => {
                info!(preferred = %preferred, "preferred service unknown, using fallback order");
            }
        }
        available
    }

    pub fn status(&self) -> ServiceStatus {
        let flags = self
            .descriptors
            .iter()
            .map(|descriptor| (descriptor.name.clone(), descriptor.is_available()))
            .collect::<Vec<_>>();
        let available_services = flags
            .iter()
            .filter(|(_, available)| *available)
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();

        // Availability flags are keyed by lowercase name; display names stay in the lists.
        ServiceStatus {
            configured: !available_services.is_empty(),
            primary_service: available_services
                .first()
                .cloned()
                .unwrap_or_else(|| "none".to_owned()),
            available_services,
            service_status: flags
                .into_iter()
                .map(|(name, available)| (name.to_lowercase(), available))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::mock::ScriptedBackend;

    fn policy() -> TimeoutPolicy {
        TimeoutPolicy::new(Duration::from_millis(100), Duration::from_secs(30))
    }

    fn descriptor(priority: u32, backend: ScriptedBackend) -> BackendDescriptor {
        BackendDescriptor::new(priority, Arc::new(backend))
    }

    fn registry() -> BackendRegistry {
        BackendRegistry::new(
            vec![
                descriptor(3, ScriptedBackend::replying("Bland", "b")),
                descriptor(1, ScriptedBackend::replying("OpenAI", "o").unavailable()),
                descriptor(2, ScriptedBackend::replying("Vapi", "v")),
                descriptor(9, ScriptedBackend::replying("Free Fallback", "f")),
            ],
            &policy(),
        )
        .expect("registry")
    }

    fn names(descriptors: &[BackendDescriptor]) -> Vec<&str> {
        descriptors.iter().map(BackendDescriptor::name).collect()
    }

    #[test]
    fn available_backends_are_listed_by_priority() {
        let registry = registry();
        assert_eq!(
            names(registry.descriptors()),
            vec!["OpenAI", "Vapi", "Bland", "Free Fallback"]
        );
        assert_eq!(
            names(&registry.list_available()),
            vec!["Vapi", "Bland", "Free Fallback"]
        );
    }

    #[test]
    fn preferred_service_narrows_case_insensitively() {
        let registry = registry();
        assert_eq!(names(&registry.candidates(Some("bLaNd"))), vec!["Bland"]);
        assert_eq!(
            names(&registry.candidates(Some("free fallback"))),
            vec!["Free Fallback"]
        );
    }

    #[test]
    fn unknown_unavailable_or_auto_preferences_use_full_order() {
        let registry = registry();
        let full = vec!["Vapi", "Bland", "Free Fallback"];
        assert_eq!(names(&registry.candidates(Some("Claude"))), full);
        assert_eq!(names(&registry.candidates(Some("openai"))), full);
        assert_eq!(names(&registry.candidates(Some("auto"))), full);
        assert_eq!(names(&registry.candidates(Some("  "))), full);
        assert_eq!(names(&registry.candidates(None)), full);
    }

    #[test]
    fn resolve_explicit_covers_unavailable_backends() {
        let registry = registry();
        assert_eq!(
            registry.resolve_explicit(" OPENAI ").map(BackendDescriptor::priority),
            Some(1)
        );
        assert!(registry.resolve_explicit("retell").is_none());
    }

    #[test]
    fn duplicate_priorities_and_names_are_rejected() {
        let priority_clash = BackendRegistry::new(
            vec![
                descriptor(1, ScriptedBackend::replying("a", "a")),
                descriptor(1, ScriptedBackend::replying("b", "b")),
            ],
            &policy(),
        );
        assert!(matches!(
            priority_clash,
            Err(ConfigError::DuplicatePriority { priority: 1, .. })
        ));

        let name_clash = BackendRegistry::new(
            vec![
                descriptor(1, ScriptedBackend::replying("Vapi", "a")),
                descriptor(2, ScriptedBackend::replying("VAPI", "b")),
            ],
            &policy(),
        );
        assert!(matches!(name_clash, Err(ConfigError::DuplicateName(name)) if name == "VAPI"));
    }

    #[test]
    fn status_reports_every_backend() {
        let status = registry().status();
        assert!(status.configured);
        assert_eq!(status.primary_service, "Vapi");
        assert_eq!(
            status.available_services,
            vec!["Vapi".to_owned(), "Bland".to_owned(), "Free Fallback".to_owned()]
        );
        assert_eq!(status.service_status.get("openai"), Some(&false));
        assert_eq!(status.service_status.get("bland"), Some(&true));
        assert_eq!(status.service_status.get("free fallback"), Some(&true));
        assert!(!status.service_status.contains_key("OpenAI"));
        assert_eq!(status.service_status.len(), 4);
    }

    #[test]
    fn empty_status_has_no_primary() {
        let registry = BackendRegistry::new(
            vec![descriptor(1, ScriptedBackend::replying("a", "a").unavailable())],
            &policy(),
        )
        .expect("registry");
        let status = registry.status();
        assert!(!status.configured);
        assert_eq!(status.primary_service, "none");
        assert!(status.available_services.is_empty());
    }
}
