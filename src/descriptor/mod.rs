//! Descriptor tree
//!
//! The resolver turns registered test classes into a three-level tree
//! `Engine → Class → Argument → TestMethod`. Every node carries a
//! hierarchical unique id; the runner walks the tree and listeners are
//! keyed by id.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::api::{Argument, ArgumentHookFn, ClassHookFn, Failure, InstanceFactoryFn};
use crate::error::EngineError;
use crate::interceptor::ClassInterceptor;

/// Engine segment value of every unique id produced by this crate.
pub const ENGINE_ID: &str = "verifyica";

/// One segment of a hierarchical unique id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    Engine(String),
    Class(String),
    Argument(usize),
    Method(String),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Engine(value) => write!(f, "[engine={value}]"),
            Segment::Class(value) => write!(f, "[class={value}]"),
            Segment::Argument(index) => write!(f, "[argument={index}]"),
            Segment::Method(value) => write!(f, "[method={value}]"),
        }
    }
}

/// The level a unique id addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeLevel {
    Engine,
    Class,
    Argument,
    TestMethod,
}

/// Hierarchical node identifier, e.g.
/// `[engine=verifyica]/[class=CacheTest]/[argument=0]/[method=get]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UniqueId {
    segments: Vec<Segment>,
}

impl UniqueId {
    /// Root id of the engine node.
    pub fn engine() -> Self {
        Self {
            segments: vec![Segment::Engine(ENGINE_ID.to_string())],
        }
    }

    pub fn class(&self, class_name: impl Into<String>) -> Self {
        self.append(Segment::Class(class_name.into()))
    }

    pub fn argument(&self, index: usize) -> Self {
        self.append(Segment::Argument(index))
    }

    pub fn method(&self, method_name: impl Into<String>) -> Self {
        self.append(Segment::Method(method_name.into()))
    }

    fn append(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn last(&self) -> &Segment {
        self.segments.last().expect("unique id is never empty")
    }

    pub fn parent(&self) -> Option<UniqueId> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Whether `self` is a proper ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &UniqueId) -> bool {
        other.segments.len() > self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    pub fn level(&self) -> NodeLevel {
        match self.last() {
            Segment::Engine(_) => NodeLevel::Engine,
            Segment::Class(_) => NodeLevel::Class,
            Segment::Argument(_) => NodeLevel::Argument,
            Segment::Method(_) => NodeLevel::TestMethod,
        }
    }

    /// The class segment value, at any depth.
    pub fn class_name(&self) -> Option<&str> {
        self.segments.iter().find_map(|segment| match segment {
            Segment::Class(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// The argument segment value, at any depth.
    pub fn argument_index(&self) -> Option<usize> {
        self.segments.iter().find_map(|segment| match segment {
            Segment::Argument(index) => Some(*index),
            _ => None,
        })
    }

    /// The method segment value.
    pub fn method_name(&self) -> Option<&str> {
        self.segments.iter().find_map(|segment| match segment {
            Segment::Method(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.segments.iter().enumerate() {
            if index > 0 {
                write!(f, "/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for UniqueId {
    type Err = EngineError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();

        for raw in input.split('/') {
            let raw = raw.trim();
            let inner = raw
                .strip_prefix('[')
                .and_then(|r| r.strip_suffix(']'))
                .ok_or_else(|| {
                    EngineError::Discovery(format!("malformed unique id segment [{raw}]"))
                })?;

            let (segment_type, value) = inner.split_once('=').ok_or_else(|| {
                EngineError::Discovery(format!("malformed unique id segment [{raw}]"))
            })?;

            let segment = match segment_type {
                "engine" => Segment::Engine(value.to_string()),
                "class" => Segment::Class(value.to_string()),
                "argument" => {
                    let index = value.parse::<usize>().map_err(|_| {
                        EngineError::Discovery(format!("argument index is not a number: [{value}]"))
                    })?;
                    Segment::Argument(index)
                }
                "method" => Segment::Method(value.to_string()),
                other => {
                    return Err(EngineError::Discovery(format!(
                        "unknown unique id segment type [{other}]"
                    )))
                }
            };

            // Segments must nest engine/class/argument/method.
            let expected_position = match segment {
                Segment::Engine(_) => 0,
                Segment::Class(_) => 1,
                Segment::Argument(_) => 2,
                Segment::Method(_) => 3,
            };
            if segments.len() != expected_position {
                return Err(EngineError::Discovery(format!(
                    "unique id segment [{segment}] out of order in [{input}]"
                )));
            }

            segments.push(segment);
        }

        if segments.is_empty() {
            return Err(EngineError::Discovery("empty unique id".to_string()));
        }

        Ok(Self { segments })
    }
}

/// A named lifecycle hook running against a class context.
#[derive(Clone)]
pub struct NamedClassHook {
    pub(crate) name: String,
    pub(crate) hook: ClassHookFn,
}

impl NamedClassHook {
    pub(crate) fn new(name: impl Into<String>, hook: ClassHookFn) -> Self {
        Self {
            name: name.into(),
            hook,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A named lifecycle hook or test body running against an argument
/// context.
#[derive(Clone)]
pub struct NamedArgumentHook {
    pub(crate) name: String,
    pub(crate) hook: ArgumentHookFn,
}

impl NamedArgumentHook {
    pub(crate) fn new(name: impl Into<String>, hook: ArgumentHookFn) -> Self {
        Self {
            name: name.into(),
            hook,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Root of the descriptor tree.
pub struct EngineDescriptor {
    pub(crate) unique_id: UniqueId,
    pub(crate) classes: Vec<Arc<ClassDescriptor>>,
}

impl EngineDescriptor {
    pub fn unique_id(&self) -> &UniqueId {
        &self.unique_id
    }

    pub fn classes(&self) -> &[Arc<ClassDescriptor>] {
        &self.classes
    }
}

impl fmt::Debug for EngineDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineDescriptor")
            .field("unique_id", &self.unique_id.to_string())
            .field("classes", &self.classes.len())
            .finish()
    }
}

/// One registered test class with its expanded arguments.
pub struct ClassDescriptor {
    pub(crate) unique_id: UniqueId,
    pub(crate) class_name: String,
    pub(crate) display_name: String,
    pub(crate) scenario: bool,
    pub(crate) argument_parallelism: usize,
    pub(crate) instance_factory: InstanceFactoryFn,
    pub(crate) prepare: Vec<NamedClassHook>,
    pub(crate) conclude: Vec<NamedClassHook>,
    pub(crate) interceptors: Vec<Arc<dyn ClassInterceptor>>,
    /// Set when the argument supplier threw; the class is announced as
    /// failed and no children exist.
    pub(crate) supplier_failure: Option<Failure>,
    pub(crate) arguments: Vec<Arc<ArgumentDescriptor>>,
}

impl ClassDescriptor {
    pub fn unique_id(&self) -> &UniqueId {
        &self.unique_id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_scenario(&self) -> bool {
        self.scenario
    }

    pub fn argument_parallelism(&self) -> usize {
        self.argument_parallelism
    }

    pub fn arguments(&self) -> &[Arc<ArgumentDescriptor>] {
        &self.arguments
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("unique_id", &self.unique_id.to_string())
            .field("arguments", &self.arguments.len())
            .field("argument_parallelism", &self.argument_parallelism)
            .field("scenario", &self.scenario)
            .finish()
    }
}

/// One argument subtree.
pub struct ArgumentDescriptor {
    pub(crate) unique_id: UniqueId,
    pub(crate) display_name: String,
    pub(crate) index: usize,
    pub(crate) argument: Arc<Argument>,
    pub(crate) before_all: Vec<NamedArgumentHook>,
    pub(crate) after_all: Vec<NamedArgumentHook>,
    pub(crate) tests: Vec<Arc<TestMethodDescriptor>>,
}

impl ArgumentDescriptor {
    pub fn unique_id(&self) -> &UniqueId {
        &self.unique_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn argument(&self) -> &Argument {
        &self.argument
    }

    pub fn tests(&self) -> &[Arc<TestMethodDescriptor>] {
        &self.tests
    }
}

impl fmt::Debug for ArgumentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgumentDescriptor")
            .field("unique_id", &self.unique_id.to_string())
            .field("tests", &self.tests.len())
            .finish()
    }
}

/// One test method within an argument subtree.
pub struct TestMethodDescriptor {
    pub(crate) unique_id: UniqueId,
    pub(crate) name: String,
    pub(crate) display_name: String,
    pub(crate) before_each: Vec<NamedArgumentHook>,
    pub(crate) test: NamedArgumentHook,
    pub(crate) after_each: Vec<NamedArgumentHook>,
}

impl TestMethodDescriptor {
    pub fn unique_id(&self) -> &UniqueId {
        &self.unique_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl fmt::Debug for TestMethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestMethodDescriptor")
            .field("unique_id", &self.unique_id.to_string())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_id_rendering() {
        let id = UniqueId::engine().class("CacheTest").argument(2).method("get");
        assert_eq!(
            id.to_string(),
            "[engine=verifyica]/[class=CacheTest]/[argument=2]/[method=get]"
        );
    }

    #[test]
    fn test_unique_id_parse_round_trip() {
        let rendered = "[engine=verifyica]/[class=CacheTest]/[argument=2]/[method=get]";
        let id: UniqueId = rendered.parse().unwrap();
        assert_eq!(id.to_string(), rendered);
        assert_eq!(id.class_name(), Some("CacheTest"));
        assert_eq!(id.argument_index(), Some(2));
        assert_eq!(id.method_name(), Some("get"));
        assert_eq!(id.level(), NodeLevel::TestMethod);
    }

    #[test]
    fn test_unique_id_parse_rejects_garbage() {
        assert!("".parse::<UniqueId>().is_err());
        assert!("[class=X]".parse::<UniqueId>().is_err());
        assert!("[engine=v]/[method=m]".parse::<UniqueId>().is_err());
        assert!("[engine=v]/[class=X]/[argument=two]".parse::<UniqueId>().is_err());
        assert!("engine=v".parse::<UniqueId>().is_err());
    }

    #[test]
    fn test_ancestry() {
        let engine = UniqueId::engine();
        let class = engine.class("X");
        let argument = class.argument(0);

        assert!(engine.is_ancestor_of(&argument));
        assert!(class.is_ancestor_of(&argument));
        assert!(!argument.is_ancestor_of(&class));
        assert!(!class.is_ancestor_of(&class));
        assert_eq!(argument.parent(), Some(class));
    }
}
