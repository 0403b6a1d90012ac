use crate::config::ChannelsConfig;
use std::collections::HashMap;
use std::fmt;

/// Behaviour of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Customer tracking backed by the location state
    Location,
    /// Room-scoped relay
    Workbench,
    /// Channel-wide relay for experiment stages
    Stage,
}

/// One configured channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec {
    pub name: String,
    pub kind: ChannelKind,
    /// Sent as `hello` on connect, if any
    pub banner: Option<String>,
}

/// Every stage channel greets as the EDA family, whatever its name
const STAGE_BANNER: &str = "Connected to namespace :- EDA";

impl ChannelSpec {
    fn new(name: &str, kind: ChannelKind) -> Self {
        let banner = match kind {
            ChannelKind::Location => None,
            ChannelKind::Workbench => {
                Some(format!("Connected to namespace :- {}", capitalise(name)))
            }
            ChannelKind::Stage => Some(STAGE_BANNER.to_string()),
        };
        Self {
            name: name.to_string(),
            kind,
            banner,
        }
    }
}

/// Channel registry errors
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    EmptyName,
    DuplicateName(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::EmptyName => write!(f, "channel name must not be empty"),
            RegistryError::DuplicateName(name) => {
                write!(f, "channel '{}' is configured more than once", name)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// The fixed set of channels served by this process.
///
/// Exactly one location channel, one workbench channel and any number of
/// stage channels, each with its own connections and rooms.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    channels: HashMap<String, ChannelSpec>,
    location: String,
}

impl ChannelRegistry {
    pub fn from_config(config: &ChannelsConfig) -> Result<Self, RegistryError> {
        let mut registry = Self {
            channels: HashMap::new(),
            location: config.location.clone(),
        };

        registry.add(ChannelSpec::new(&config.location, ChannelKind::Location))?;
        registry.add(ChannelSpec::new(&config.workbench, ChannelKind::Workbench))?;
        for stage in &config.stages {
            registry.add(ChannelSpec::new(stage, ChannelKind::Stage))?;
        }

        Ok(registry)
    }

    fn add(&mut self, spec: ChannelSpec) -> Result<(), RegistryError> {
        if spec.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.channels.contains_key(&spec.name) {
            return Err(RegistryError::DuplicateName(spec.name));
        }
        self.channels.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ChannelSpec> {
        self.channels.get(name)
    }

    /// Name of the location channel
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelSpec> {
        self.channels.values()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

fn capitalise(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
