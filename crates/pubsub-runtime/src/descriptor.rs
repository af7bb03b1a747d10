//! Consumer declaration and descriptor scanning.
//!
//! Handler types declare their routing metadata explicitly, either through a
//! [`ConsumerCatalog`] filled by bootstrap code or through the [`consumer!`]
//! macro, which self-registers the type for [`InventoryDiscovery`].
//! [`ConsumerScanner`] turns every declared type into a [`ConsumerDescriptor`].

use crate::error::DiscoveryError;
use crate::handler::{Consumer, HandlerLifetime, HandlerType, MessageHandler};
use crate::message::MessageType;
use crate::registry::ProviderKey;
use regex::{Regex, RegexBuilder};
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;

// ============================================================================
// Declaration metadata
// ============================================================================

/// Routing metadata attached to a consumer type
///
/// # Examples
///
/// ```rust
/// use pubsub_runtime::descriptor::ConsumerOptions;
///
/// let options = ConsumerOptions::new()
///     .provider_key("InMemory1")
///     .queue_name("orders")
///     .prefetch_count(32);
/// assert_eq!(options.prefetch_count, 32);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerOptions {
    /// Provider to consume from, empty for every provider
    pub provider_key: String,
    /// Queue name, empty to derive it from the handler type name
    pub queue_name: String,
    /// Prefetch hint, 0 for the transport default
    pub prefetch_count: u32,
    pub lifetime: HandlerLifetime,
}

impl ConsumerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider_key(mut self, key: impl Into<String>) -> Self {
        self.provider_key = key.into();
        self
    }

    pub fn queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue_name = name.into();
        self
    }

    pub fn prefetch_count(mut self, count: u32) -> Self {
        self.prefetch_count = count;
        self
    }

    pub fn lifetime(mut self, lifetime: HandlerLifetime) -> Self {
        self.lifetime = lifetime;
        self
    }
}

/// A handler type offered by a discovery source, with or without metadata
#[derive(Debug, Clone)]
pub struct CandidateType {
    pub handler_type: HandlerType,
    pub message_type: MessageType,
    pub binding: Option<ConsumerOptions>,
}

impl CandidateType {
    /// Candidate for a typed consumer carrying binding metadata
    pub fn consumer<C: Consumer>(options: ConsumerOptions) -> Self {
        Self {
            handler_type: HandlerType::of::<C>(),
            message_type: MessageType::of::<C::Message>(),
            binding: Some(options),
        }
    }

    /// Candidate without binding metadata; the scanner skips it
    pub fn unbound(handler_type: HandlerType, message_type: MessageType) -> Self {
        Self {
            handler_type,
            message_type,
            binding: None,
        }
    }
}

/// Routing metadata extracted from one handler type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerDescriptor {
    pub handler_type: HandlerType,
    pub message_type: MessageType,
    /// Empty binds to every provider
    pub provider_key_filter: String,
    /// Empty derives the queue name from the handler type
    pub queue_name_override: String,
    pub prefetch_count: u32,
    pub lifetime: HandlerLifetime,
}

impl ConsumerDescriptor {
    fn from_candidate(handler_type: HandlerType, message_type: MessageType, options: ConsumerOptions) -> Self {
        Self {
            handler_type,
            message_type,
            provider_key_filter: options.provider_key.trim().to_string(),
            queue_name_override: options.queue_name.trim().to_string(),
            prefetch_count: options.prefetch_count,
            lifetime: options.lifetime,
        }
    }

    /// Queue override if set, otherwise the handler's fully-qualified type name
    ///
    /// Derived names drop whitespace (`Pair<u8, u16>` becomes `Pair<u8,u16>`)
    /// and keep the trailing 260 bytes of very long paths.
    pub fn resolved_queue_name(&self) -> Cow<'_, str> {
        if self.queue_name_override.is_empty() {
            derived_queue_name(self.handler_type.as_str())
        } else {
            Cow::Borrowed(&self.queue_name_override)
        }
    }

    /// Check if this consumer binds to the given provider
    pub fn binds_to(&self, provider_key: &str) -> bool {
        if self.provider_key_filter.is_empty() {
            return true;
        }
        ProviderKey::new(self.provider_key_filter.as_str()).is_ok_and(|key| key.matches(provider_key))
    }
}

const MAX_DERIVED_QUEUE_NAME: usize = 260;

fn derived_queue_name(type_name: &str) -> Cow<'_, str> {
    let needs_cleanup = type_name.chars().any(|c| c.is_whitespace() || c.is_control());
    if !needs_cleanup && type_name.len() <= MAX_DERIVED_QUEUE_NAME {
        return Cow::Borrowed(type_name);
    }

    let cleaned: String = type_name
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    if cleaned.len() <= MAX_DERIVED_QUEUE_NAME {
        return Cow::Owned(cleaned);
    }

    let mut start = cleaned.len() - MAX_DERIVED_QUEUE_NAME;
    while !cleaned.is_char_boundary(start) {
        start += 1;
    }
    Cow::Owned(cleaned[start..].to_string())
}

// ============================================================================
// Discovery sources
// ============================================================================

/// Source of candidate handler types
pub trait TypeDiscovery: Send + Sync {
    /// Name used in diagnostics
    fn source_name(&self) -> &str;

    fn candidate_types(&self) -> Result<Vec<CandidateType>, DiscoveryError>;
}

/// Explicit registration list filled by application bootstrap code
#[derive(Debug, Clone, Default)]
pub struct ConsumerCatalog {
    candidates: Vec<CandidateType>,
}

impl ConsumerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a consumer with its binding metadata
    pub fn declare<C: Consumer>(&mut self, options: ConsumerOptions) -> &mut Self {
        self.candidates.push(CandidateType::consumer::<C>(options));
        self
    }

    /// Add an arbitrary candidate
    pub fn insert(&mut self, candidate: CandidateType) -> &mut Self {
        self.candidates.push(candidate);
        self
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl TypeDiscovery for ConsumerCatalog {
    fn source_name(&self) -> &str {
        "catalog"
    }

    fn candidate_types(&self) -> Result<Vec<CandidateType>, DiscoveryError> {
        Ok(self.candidates.clone())
    }
}

/// Static registration entry submitted by the [`consumer!`] macro
pub struct ConsumerRegistration {
    pub describe: fn() -> CandidateType,
    pub construct: fn() -> Arc<dyn MessageHandler>,
}

inventory::collect!(ConsumerRegistration);

/// Every registration submitted with [`consumer!`] in the final binary
pub fn registered_consumers() -> impl Iterator<Item = &'static ConsumerRegistration> {
    inventory::iter::<ConsumerRegistration>()
}

/// Discovery over consumers self-registered with [`consumer!`]
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryDiscovery;

impl TypeDiscovery for InventoryDiscovery {
    fn source_name(&self) -> &str {
        "inventory"
    }

    fn candidate_types(&self) -> Result<Vec<CandidateType>, DiscoveryError> {
        Ok(registered_consumers()
            .map(|registration| (registration.describe)())
            .collect())
    }
}

/// Declare a consumer type for static discovery.
///
/// The type must implement [`Consumer`] and `Default`; options are the
/// builder methods of [`ConsumerOptions`].
///
/// ```rust,ignore
/// consumer!(AuditConsumer);
/// consumer!(BillingConsumer, provider_key = "InMemory1", prefetch_count = 16);
/// ```
#[macro_export]
macro_rules! consumer {
    ($consumer:ty $(, $option:ident = $value:expr)* $(,)?) => {
        $crate::inventory::submit! {
            $crate::descriptor::ConsumerRegistration {
                describe: || {
                    #[allow(unused_mut)]
                    let mut options = $crate::descriptor::ConsumerOptions::new();
                    $( options = options.$option($value); )*
                    $crate::descriptor::CandidateType::consumer::<$consumer>(options)
                },
                construct: || {
                    $crate::handler::ConsumerHandler::into_handler(
                        <$consumer as ::std::default::Default>::default(),
                    )
                },
            }
        }
    };
}

// ============================================================================
// Scanner
// ============================================================================

/// Extracts consumer descriptors from discovery sources
#[derive(Debug, Clone, Default)]
pub struct ConsumerScanner {
    filter: Option<Regex>,
}

impl ConsumerScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Narrow candidates to handler type names matching `pattern` (case-insensitive)
    pub fn with_filter(pattern: &str) -> Result<Self, DiscoveryError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| DiscoveryError::InvalidFilter {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            filter: Some(regex),
        })
    }

    /// Produce a descriptor for every candidate carrying binding metadata.
    ///
    /// Sources are read in order; a handler type offered twice keeps its first
    /// declaration.
    pub fn scan(&self, sources: &[&dyn TypeDiscovery]) -> Result<Vec<ConsumerDescriptor>, DiscoveryError> {
        let mut seen = HashSet::new();
        let mut descriptors = Vec::new();

        for source in sources {
            for candidate in source.candidate_types()? {
                let Some(options) = candidate.binding else {
                    continue;
                };

                if let Some(filter) = &self.filter {
                    if !filter.is_match(candidate.handler_type.as_str()) {
                        continue;
                    }
                }

                if !seen.insert(candidate.handler_type.clone()) {
                    tracing::debug!(
                        handler = %candidate.handler_type,
                        source = source.source_name(),
                        "Ignoring repeated consumer declaration"
                    );
                    continue;
                }

                descriptors.push(ConsumerDescriptor::from_candidate(
                    candidate.handler_type,
                    candidate.message_type,
                    options,
                ));
            }
        }

        Ok(descriptors)
    }
}

#[cfg(test)]
#[path = "descriptor_tests.rs"]
mod tests;
