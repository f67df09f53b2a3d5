//! Category topic names.

use meridian_core::category::EventCategory;
use meridian_core::error::DomainError;

/// Topic names per category plus the dead-letter topic.
///
/// Defaults follow `<namespace>.audit.<env>.<category>.v1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicConfig {
    business: String,
    security: String,
    system: String,
    compliance: String,
    dead_letter: String,
}

impl TopicConfig {
    /// Versioned default topic names for a namespace and environment.
    #[must_use]
    pub fn new(namespace: &str, env: &str) -> Self {
        let name = |segment: &str| format!("{namespace}.audit.{env}.{segment}.v1");
        Self {
            business: name(EventCategory::Business.slug()),
            security: name(EventCategory::Security.slug()),
            system: name(EventCategory::System.slug()),
            compliance: name(EventCategory::Compliance.slug()),
            dead_letter: name("dead-letter"),
        }
    }

    /// Overrides the topic of one category.
    #[must_use]
    pub fn with_topic(mut self, category: EventCategory, topic: impl Into<String>) -> Self {
        let topic = topic.into();
        match category {
            EventCategory::Business => self.business = topic,
            EventCategory::Security => self.security = topic,
            EventCategory::System => self.system = topic,
            EventCategory::Compliance => self.compliance = topic,
        }
        self
    }

    /// Overrides the dead-letter topic.
    #[must_use]
    pub fn with_dead_letter(mut self, topic: impl Into<String>) -> Self {
        self.dead_letter = topic.into();
        self
    }

    /// Topic of a category.
    #[must_use]
    pub fn topic(&self, category: EventCategory) -> &str {
        match category {
            EventCategory::Business => &self.business,
            EventCategory::Security => &self.security,
            EventCategory::System => &self.system,
            EventCategory::Compliance => &self.compliance,
        }
    }

    /// Dead-letter topic.
    #[must_use]
    pub fn dead_letter(&self) -> &str {
        &self.dead_letter
    }

    /// Topics of the given categories, in the given order.
    #[must_use]
    pub fn topics_for(&self, categories: &[EventCategory]) -> Vec<String> {
        categories.iter().map(|c| self.topic(*c).to_owned()).collect()
    }

    /// Reverse lookup from topic name to the first category using it.
    fn category_for_topic(&self, topic: &str) -> Option<EventCategory> {
        EventCategory::ALL
            .into_iter()
            .find(|category| self.topic(*category) == topic)
    }

    /// Checks that every category has a topic of its own and that the
    /// dead-letter topic is not a category topic.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` naming the first shared topic.
    pub fn validate(&self) -> Result<(), DomainError> {
        for category in EventCategory::ALL {
            let topic = self.topic(category);
            if let Some(owner) = self.category_for_topic(topic).filter(|c| *c != category) {
                return Err(DomainError::Validation(format!(
                    "topic {topic} is used by both {} and {}",
                    owner.as_str(),
                    category.as_str()
                )));
            }
        }
        if let Some(owner) = self.category_for_topic(&self.dead_letter) {
            return Err(DomainError::Validation(format!(
                "dead-letter topic {} is also the {} topic",
                self.dead_letter,
                owner.as_str()
            )));
        }
        Ok(())
    }
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self::new("meridian", "dev")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names_are_versioned() {
        let topics = TopicConfig::new("erp", "prod");

        assert_eq!(topics.topic(EventCategory::Business), "erp.audit.prod.business.v1");
        assert_eq!(topics.topic(EventCategory::Security), "erp.audit.prod.security.v1");
        assert_eq!(topics.topic(EventCategory::System), "erp.audit.prod.system.v1");
        assert_eq!(topics.topic(EventCategory::Compliance), "erp.audit.prod.compliance.v1");
        assert_eq!(topics.dead_letter(), "erp.audit.prod.dead-letter.v1");
    }

    #[test]
    fn test_override_and_reverse_lookup() {
        let topics = TopicConfig::default().with_topic(EventCategory::Security, "sec-events");

        assert_eq!(topics.topic(EventCategory::Security), "sec-events");
        assert_eq!(topics.category_for_topic("sec-events"), Some(EventCategory::Security));
        assert_eq!(
            topics.category_for_topic("meridian.audit.dev.business.v1"),
            Some(EventCategory::Business)
        );
        assert_eq!(topics.category_for_topic("unknown"), None);
    }

    #[test]
    fn test_distinct_topics_validate() {
        let topics = TopicConfig::default().with_topic(EventCategory::Security, "sec-events");

        assert!(topics.validate().is_ok());
    }

    #[test]
    fn test_shared_category_topic_is_rejected() {
        let topics = TopicConfig::default()
            .with_topic(EventCategory::Security, "audit-all")
            .with_topic(EventCategory::System, "audit-all");

        let result = topics.validate();

        assert!(matches!(
            result,
            Err(DomainError::Validation(msg)) if msg.contains("SECURITY") && msg.contains("SYSTEM")
        ));
    }

    #[test]
    fn test_dead_letter_sharing_a_category_topic_is_rejected() {
        let topics = TopicConfig::default().with_dead_letter("meridian.audit.dev.business.v1");

        assert!(matches!(topics.validate(), Err(DomainError::Validation(_))));
    }
}
