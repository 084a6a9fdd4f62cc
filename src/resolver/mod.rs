//! Discovery resolver
//!
//! Folds discovery selectors into per-class selections, applies
//! class-definition filters, invokes argument suppliers, validates the
//! definitions, and builds the descriptor tree in stable order.

pub mod filters;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use rand::seq::SliceRandom;
use regex::Regex;

use crate::api::{Argument, EngineContext, Failure};
use crate::descriptor::{
    ArgumentDescriptor, ClassDescriptor, EngineDescriptor, NamedArgumentHook, TestMethodDescriptor,
    UniqueId,
};
use crate::error::EngineError;
use crate::interceptor::ClassInterceptor;
use crate::registry::TestClassDefinition;

use filters::FilterDefinition;

/// What part of the registered test classes a discovery request
/// addresses.
#[derive(Clone, Debug)]
pub enum DiscoverySelector {
    /// Every registered class.
    All,
    /// Classes whose name starts with the given prefix.
    Package(String),
    /// One class by name.
    Class(String),
    /// One test method of one class.
    Method { class: String, method: String },
    /// A node addressed by unique id; ancestors are implied.
    UniqueId(UniqueId),
}

/// A discovery request: selectors plus class-definition filters.
#[derive(Clone, Debug, Default)]
pub struct DiscoveryRequest {
    selectors: Vec<DiscoverySelector>,
    include_class_names: Vec<Regex>,
    exclude_class_names: Vec<Regex>,
    include_tags: Vec<String>,
}

impl DiscoveryRequest {
    /// Select every registered class.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn select(mut self, selector: DiscoverySelector) -> Self {
        self.selectors.push(selector);
        self
    }

    pub fn select_class(self, class: impl Into<String>) -> Self {
        self.select(DiscoverySelector::Class(class.into()))
    }

    pub fn select_package(self, package: impl Into<String>) -> Self {
        self.select(DiscoverySelector::Package(package.into()))
    }

    pub fn select_method(self, class: impl Into<String>, method: impl Into<String>) -> Self {
        self.select(DiscoverySelector::Method {
            class: class.into(),
            method: method.into(),
        })
    }

    pub fn select_unique_id(self, unique_id: UniqueId) -> Self {
        self.select(DiscoverySelector::UniqueId(unique_id))
    }

    pub fn include_class_name(mut self, pattern: Regex) -> Self {
        self.include_class_names.push(pattern);
        self
    }

    pub fn exclude_class_name(mut self, pattern: Regex) -> Self {
        self.exclude_class_names.push(pattern);
        self
    }

    /// Keep only classes carrying at least one of the included tags.
    pub fn include_tag(mut self, tag: impl Into<String>) -> Self {
        self.include_tags.push(tag.into());
        self
    }
}

/// Per-class selection folded from the request's selectors.
#[derive(Default)]
struct Selection {
    all_methods: bool,
    methods: HashSet<String>,
    all_arguments: bool,
    argument_indices: BTreeSet<usize>,
}

impl Selection {
    fn select_whole_class(&mut self) {
        self.all_methods = true;
        self.all_arguments = true;
    }

    fn method_selected(&self, name: &str) -> bool {
        self.all_methods || self.methods.contains(name)
    }

    fn argument_selected(&self, index: usize) -> bool {
        self.all_arguments || self.argument_indices.contains(&index)
    }
}

/// Build the descriptor tree for a request.
pub(crate) fn resolve(
    engine_context: &EngineContext,
    definitions: &[TestClassDefinition],
    request: &DiscoveryRequest,
) -> Result<EngineDescriptor, EngineError> {
    let configuration = engine_context.configuration();
    let argument_parallelism_ceiling = configuration.argument_parallelism()?;

    let selections = fold_selectors(definitions, &request.selectors)?;
    let file_filters = match configuration.filters_filename() {
        Some(path) => filters::load_filter_file(path)?,
        None => Vec::new(),
    };

    let engine_id = UniqueId::engine();
    let mut seen_class_names = HashSet::new();
    let mut classes = Vec::new();

    for definition in definitions {
        if !seen_class_names.insert(definition.name.clone()) {
            return Err(EngineError::definition(
                &definition.name,
                "registered more than once",
            ));
        }

        if definition.disabled {
            tracing::debug!("test class [{}] is disabled", definition.name);
            continue;
        }

        let selection = match selections.get(definition.name.as_str()) {
            Some(selection) => selection,
            None => continue,
        };

        // Validation and supplier invocation precede class-definition
        // filtering: a filtered-out class still fails discovery when its
        // definition is malformed.
        validate_definition(definition)?;

        let outcome = invoke_supplier(engine_context, definition)?;

        if !class_name_kept(request, &file_filters, &definition.name) {
            tracing::debug!("test class [{}] filtered out", definition.name);
            continue;
        }

        if !tags_kept(request, definition) {
            tracing::debug!("test class [{}] has no included tag", definition.name);
            continue;
        }

        let class_id = engine_id.class(definition.name.as_str());
        let display_name = definition
            .display_name
            .clone()
            .unwrap_or_else(|| definition.name.clone());
        let argument_parallelism = definition
            .argument_parallelism
            .min(argument_parallelism_ceiling)
            .max(1);

        let interceptors: Vec<Arc<dyn ClassInterceptor>> = definition
            .interceptor_suppliers
            .iter()
            .flat_map(|supplier| supplier())
            .collect();

        let make_class = |supplier_failure, arguments| ClassDescriptor {
            unique_id: class_id.clone(),
            class_name: definition.name.clone(),
            display_name: display_name.clone(),
            scenario: definition.scenario,
            argument_parallelism,
            instance_factory: definition.instance_factory.clone(),
            prepare: definition.prepare.clone(),
            conclude: definition.conclude.clone(),
            interceptors: interceptors.clone(),
            supplier_failure,
            arguments,
        };

        let arguments = match outcome {
            SupplierOutcome::Pruned => continue,
            SupplierOutcome::Failed(failure) => {
                classes.push((
                    definition.order,
                    display_name.clone(),
                    Arc::new(make_class(Some(failure), Vec::new())),
                ));
                continue;
            }
            SupplierOutcome::Arguments(arguments) => arguments,
        };

        let tests = ordered_tests(definition, selection);
        if tests.is_empty() {
            tracing::debug!("test class [{}] has no selected tests", definition.name);
            continue;
        }

        let mut argument_descriptors = Vec::new();
        for (index, argument) in arguments.into_iter().enumerate() {
            if !selection.argument_selected(index) {
                continue;
            }

            let argument = Arc::new(argument);
            let argument_id = class_id.argument(index);

            let test_descriptors: Vec<Arc<TestMethodDescriptor>> = tests
                .iter()
                .map(|test| {
                    Arc::new(TestMethodDescriptor {
                        unique_id: argument_id.method(test.0.as_str()),
                        name: test.0.clone(),
                        display_name: test.1.clone(),
                        before_each: definition.before_each.clone(),
                        test: test.2.clone(),
                        after_each: definition.after_each.clone(),
                    })
                })
                .collect();

            argument_descriptors.push(Arc::new(ArgumentDescriptor {
                unique_id: argument_id,
                display_name: argument.name().to_string(),
                index,
                argument,
                before_all: definition.before_all.clone(),
                after_all: definition.after_all.clone(),
                tests: test_descriptors,
            }));
        }

        if argument_descriptors.is_empty() {
            tracing::debug!("test class [{}] has no selected arguments", definition.name);
            continue;
        }

        classes.push((
            definition.order,
            display_name.clone(),
            Arc::new(make_class(None, argument_descriptors)),
        ));
    }

    classes.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
    let mut classes: Vec<Arc<ClassDescriptor>> =
        classes.into_iter().map(|(_, _, class)| class).collect();

    if configuration.shuffle_test_classes()? {
        classes.shuffle(&mut rand::thread_rng());
    }

    tracing::debug!("resolved {} test class(es)", classes.len());

    Ok(EngineDescriptor {
        unique_id: engine_id,
        classes,
    })
}

enum SupplierOutcome {
    Pruned,
    Failed(Failure),
    Arguments(Vec<Argument>),
}

fn invoke_supplier(
    engine_context: &EngineContext,
    definition: &TestClassDefinition,
) -> Result<SupplierOutcome, EngineError> {
    let supplier = definition.argument_supplier.as_ref().ok_or_else(|| {
        EngineError::definition(&definition.name, "no argument supplier registered")
    })?;

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| supplier(engine_context)));

    Ok(match outcome {
        Ok(Ok(Some(arguments))) => SupplierOutcome::Arguments(arguments.normalize()),
        Ok(Ok(None)) => SupplierOutcome::Pruned,
        Ok(Err(failure)) => {
            tracing::warn!(
                "argument supplier failed for [{}]: {failure}",
                definition.name
            );
            SupplierOutcome::Failed(failure)
        }
        Err(_) => {
            tracing::warn!("argument supplier panicked for [{}]", definition.name);
            SupplierOutcome::Failed(Failure::message(format!(
                "argument supplier panicked for [{}]",
                definition.name
            )))
        }
    })
}

/// Selected, enabled test methods in `(order, display name)` order as
/// `(name, display name, hook)` tuples.
fn ordered_tests(
    definition: &TestClassDefinition,
    selection: &Selection,
) -> Vec<(String, String, NamedArgumentHook)> {
    let mut tests: Vec<_> = definition
        .tests
        .iter()
        .filter(|test| !test.disabled && selection.method_selected(&test.name))
        .map(|test| {
            let display_name = test
                .display_name
                .clone()
                .unwrap_or_else(|| test.name.clone());
            (
                test.order,
                test.name.clone(),
                display_name,
                NamedArgumentHook::new(test.name.clone(), test.test.clone()),
            )
        })
        .collect();

    tests.sort_by(|a, b| (a.0, &a.2).cmp(&(b.0, &b.2)));
    tests
        .into_iter()
        .map(|(_, name, display_name, hook)| (name, display_name, hook))
        .collect()
}

fn fold_selectors(
    definitions: &[TestClassDefinition],
    selectors: &[DiscoverySelector],
) -> Result<HashMap<String, Selection>, EngineError> {
    let mut selections: HashMap<String, Selection> = HashMap::new();
    let mut select_all = selectors.is_empty();

    for selector in selectors {
        match selector {
            DiscoverySelector::All => select_all = true,
            DiscoverySelector::Package(prefix) => {
                for definition in definitions {
                    if definition.name.starts_with(prefix.as_str()) {
                        selections
                            .entry(definition.name.clone())
                            .or_default()
                            .select_whole_class();
                    }
                }
            }
            DiscoverySelector::Class(class) => {
                selections
                    .entry(class.clone())
                    .or_default()
                    .select_whole_class();
            }
            DiscoverySelector::Method { class, method } => {
                let selection = selections.entry(class.clone()).or_default();
                selection.methods.insert(method.clone());
                selection.all_arguments = true;
            }
            DiscoverySelector::UniqueId(unique_id) => {
                let class = unique_id.class_name().ok_or_else(|| {
                    EngineError::Discovery(format!(
                        "unique id selector has no class segment: [{unique_id}]"
                    ))
                })?;
                let selection = selections.entry(class.to_string()).or_default();

                match (unique_id.argument_index(), unique_id.method_name()) {
                    (None, None) => selection.select_whole_class(),
                    (Some(index), None) => {
                        selection.argument_indices.insert(index);
                        selection.all_methods = true;
                    }
                    (Some(index), Some(method)) => {
                        selection.argument_indices.insert(index);
                        selection.methods.insert(method.to_string());
                    }
                    (None, Some(method)) => {
                        selection.methods.insert(method.to_string());
                        selection.all_arguments = true;
                    }
                }
            }
        }
    }

    if select_all {
        for definition in definitions {
            selections
                .entry(definition.name.clone())
                .or_default()
                .select_whole_class();
        }
    }

    Ok(selections)
}

fn class_name_kept(
    request: &DiscoveryRequest,
    file_filters: &[FilterDefinition],
    class_name: &str,
) -> bool {
    let mut combined: Vec<FilterDefinition> = request
        .include_class_names
        .iter()
        .cloned()
        .map(FilterDefinition::IncludeClassName)
        .chain(
            request
                .exclude_class_names
                .iter()
                .cloned()
                .map(FilterDefinition::ExcludeClassName),
        )
        .collect();
    combined.extend(file_filters.iter().cloned());

    filters::keep_class(&combined, class_name)
}

fn tags_kept(request: &DiscoveryRequest, definition: &TestClassDefinition) -> bool {
    request.include_tags.is_empty()
        || definition
            .tags
            .iter()
            .any(|tag| request.include_tags.contains(tag))
}

/// Structural validation: unique hook names per role, unique test names.
fn validate_definition(definition: &TestClassDefinition) -> Result<(), EngineError> {
    let class_roles = [
        ("prepare", &definition.prepare),
        ("conclude", &definition.conclude),
    ];
    for (role, hooks) in class_roles {
        check_unique(definition, role, hooks.iter().map(|hook| hook.name()))?;
    }

    let argument_roles = [
        ("beforeAll", &definition.before_all),
        ("afterAll", &definition.after_all),
        ("beforeEach", &definition.before_each),
        ("afterEach", &definition.after_each),
    ];
    for (role, hooks) in argument_roles {
        check_unique(definition, role, hooks.iter().map(|hook| hook.name()))?;
    }

    check_unique(
        definition,
        "test",
        definition.tests.iter().map(|test| test.name()),
    )
}

fn check_unique<'a>(
    definition: &TestClassDefinition,
    role: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), EngineError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(EngineError::definition(
                &definition.name,
                format!("duplicate {role} hook [{name}]"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Arguments;
    use crate::config::{keys, Configuration};
    use crate::registry::TestMethodDefinition;

    fn engine_context(configuration: Configuration) -> EngineContext {
        EngineContext::new(configuration)
    }

    fn basic_definition(name: &str) -> TestClassDefinition {
        TestClassDefinition::new(name)
            .argument_supplier(|_| Ok(Some(Arguments::values(["x", "y"]))))
            .test("t1", |_, _| async { Ok(()) })
            .test("t2", |_, _| async { Ok(()) })
    }

    fn resolve_all(
        configuration: Configuration,
        definitions: &[TestClassDefinition],
    ) -> Result<EngineDescriptor, EngineError> {
        resolve(
            &engine_context(configuration),
            definitions,
            &DiscoveryRequest::all(),
        )
    }

    #[test]
    fn test_builds_full_tree() {
        let tree = resolve_all(Configuration::new(), &[basic_definition("A")]).unwrap();

        assert_eq!(tree.classes().len(), 1);
        let class = &tree.classes()[0];
        assert_eq!(class.arguments().len(), 2);
        assert_eq!(class.arguments()[0].display_name(), "argument[0]");
        assert_eq!(class.arguments()[0].tests().len(), 2);
        assert_eq!(
            class.arguments()[1].tests()[0].unique_id().to_string(),
            "[engine=verifyica]/[class=A]/[argument=1]/[method=t1]"
        );
    }

    #[test]
    fn test_classes_ordered_by_order_then_name() {
        let definitions = [
            basic_definition("B").order(1),
            basic_definition("A").order(1),
            basic_definition("C").order(-5),
        ];
        let tree = resolve_all(Configuration::new(), &definitions).unwrap();

        let names: Vec<_> = tree
            .classes()
            .iter()
            .map(|class| class.class_name().to_string())
            .collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_tests_ordered_within_argument() {
        let definition = TestClassDefinition::new("T")
            .argument_supplier(|_| Ok(Some(Arguments::values([0u8]))))
            .test_method(TestMethodDefinition::new("z", |_, _| async { Ok(()) }).order(2))
            .test_method(TestMethodDefinition::new("a", |_, _| async { Ok(()) }).order(2))
            .test_method(TestMethodDefinition::new("m", |_, _| async { Ok(()) }).order(1));

        let tree = resolve_all(Configuration::new(), &[definition]).unwrap();
        let tests: Vec<_> = tree.classes()[0].arguments()[0]
            .tests()
            .iter()
            .map(|test| test.name().to_string())
            .collect();

        assert_eq!(tests, vec!["m", "a", "z"]);
    }

    #[test]
    fn test_supplier_none_prunes_class() {
        let definition = TestClassDefinition::new("Pruned")
            .argument_supplier(|_| Ok(None))
            .test("t", |_, _| async { Ok(()) });

        let tree = resolve_all(Configuration::new(), &[definition]).unwrap();
        assert!(tree.classes().is_empty());
    }

    #[test]
    fn test_supplier_failure_keeps_failed_class() {
        let definition = TestClassDefinition::new("Broken")
            .argument_supplier(|_| Err(Failure::message("supplier broke")))
            .test("t", |_, _| async { Ok(()) });

        let tree = resolve_all(Configuration::new(), &[definition]).unwrap();
        assert_eq!(tree.classes().len(), 1);
        assert!(tree.classes()[0].supplier_failure.is_some());
        assert!(tree.classes()[0].arguments().is_empty());
    }

    #[test]
    fn test_supplier_panic_is_a_failure() {
        let definition = TestClassDefinition::new("Panics")
            .argument_supplier(|_| panic!("nope"))
            .test("t", |_, _| async { Ok(()) });

        let tree = resolve_all(Configuration::new(), &[definition]).unwrap();
        assert!(tree.classes()[0].supplier_failure.is_some());
    }

    #[test]
    fn test_missing_supplier_is_fatal() {
        let definition = TestClassDefinition::new("NoSupplier").test("t", |_, _| async { Ok(()) });
        assert!(resolve_all(Configuration::new(), &[definition]).is_err());
    }

    #[test]
    fn test_duplicate_hook_names_are_fatal() {
        let definition = basic_definition("T")
            .before_all("setup", |_, _| async { Ok(()) })
            .before_all("setup", |_, _| async { Ok(()) });

        let error = resolve_all(Configuration::new(), &[definition]).unwrap_err();
        assert!(error.to_string().contains("duplicate beforeAll"));
    }

    #[test]
    fn test_duplicate_class_registration_is_fatal() {
        let definitions = [basic_definition("T"), basic_definition("T")];
        assert!(resolve_all(Configuration::new(), &definitions).is_err());
    }

    #[test]
    fn test_disabled_tests_removed() {
        let definition = TestClassDefinition::new("T")
            .argument_supplier(|_| Ok(Some(Arguments::values([0u8]))))
            .test("keep", |_, _| async { Ok(()) })
            .test_method(
                TestMethodDefinition::new("drop", |_, _| async { Ok(()) }).disabled(true),
            );

        let tree = resolve_all(Configuration::new(), &[definition]).unwrap();
        let tests = tree.classes()[0].arguments()[0].tests();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].name(), "keep");
    }

    #[test]
    fn test_all_tests_disabled_prunes_class() {
        let definition = TestClassDefinition::new("T")
            .argument_supplier(|_| Ok(Some(Arguments::values([0u8]))))
            .test_method(TestMethodDefinition::new("t", |_, _| async { Ok(()) }).disabled(true));

        let tree = resolve_all(Configuration::new(), &[definition]).unwrap();
        assert!(tree.classes().is_empty());
    }

    #[test]
    fn test_class_selector() {
        let request = DiscoveryRequest::all().select_class("A");
        let tree = resolve(
            &engine_context(Configuration::new()),
            &[basic_definition("A"), basic_definition("B")],
            &request,
        )
        .unwrap();

        assert_eq!(tree.classes().len(), 1);
        assert_eq!(tree.classes()[0].class_name(), "A");
    }

    #[test]
    fn test_method_selector() {
        let request = DiscoveryRequest::all().select_method("A", "t2");
        let tree = resolve(
            &engine_context(Configuration::new()),
            &[basic_definition("A")],
            &request,
        )
        .unwrap();

        let tests = tree.classes()[0].arguments()[0].tests();
        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].name(), "t2");
    }

    #[test]
    fn test_unique_id_argument_selector() {
        let unique_id: UniqueId = "[engine=verifyica]/[class=A]/[argument=1]".parse().unwrap();
        let request = DiscoveryRequest::all().select_unique_id(unique_id);
        let tree = resolve(
            &engine_context(Configuration::new()),
            &[basic_definition("A"), basic_definition("B")],
            &request,
        )
        .unwrap();

        assert_eq!(tree.classes().len(), 1);
        let class = &tree.classes()[0];
        assert_eq!(class.arguments().len(), 1);
        // The surviving argument keeps its supplier index.
        assert_eq!(class.arguments()[0].index(), 1);
        assert_eq!(class.arguments()[0].tests().len(), 2);
    }

    #[test]
    fn test_package_selector() {
        let request = DiscoveryRequest::all().select_package("cache::");
        let tree = resolve(
            &engine_context(Configuration::new()),
            &[
                basic_definition("cache::GetTest"),
                basic_definition("cache::PutTest"),
                basic_definition("queue::PopTest"),
            ],
            &request,
        )
        .unwrap();

        assert_eq!(tree.classes().len(), 2);
        assert!(tree
            .classes()
            .iter()
            .all(|class| class.class_name().starts_with("cache::")));
    }

    #[test]
    fn test_filter_file() {
        let path = std::env::temp_dir().join(format!(
            "verifyica-filters-{}.txt",
            std::process::id()
        ));
        std::fs::write(&path, "# drop the slow ones\nEXCLUDE CLASS_NAME Slow\n").unwrap();

        let configuration = Configuration::new().with(
            keys::FILTERS_FILENAME,
            path.to_string_lossy().to_string(),
        );
        let tree = resolve_all(
            configuration,
            &[basic_definition("FastTest"), basic_definition("SlowTest")],
        )
        .unwrap();

        std::fs::remove_file(&path).ok();

        assert_eq!(tree.classes().len(), 1);
        assert_eq!(tree.classes()[0].class_name(), "FastTest");
    }

    #[test]
    fn test_missing_filter_file_is_fatal() {
        let configuration =
            Configuration::new().with(keys::FILTERS_FILENAME, "/nonexistent/filters.txt");
        let error = resolve_all(configuration, &[basic_definition("T")]).unwrap_err();
        assert!(matches!(error, EngineError::FilterParse(_)));
    }

    #[test]
    fn test_class_name_filters() {
        let request = DiscoveryRequest::all()
            .include_class_name(Regex::new("^Cache").unwrap())
            .exclude_class_name(Regex::new("Slow").unwrap());

        let tree = resolve(
            &engine_context(Configuration::new()),
            &[
                basic_definition("CacheTest"),
                basic_definition("CacheSlowTest"),
                basic_definition("QueueTest"),
            ],
            &request,
        )
        .unwrap();

        assert_eq!(tree.classes().len(), 1);
        assert_eq!(tree.classes()[0].class_name(), "CacheTest");
    }

    #[test]
    fn test_filtered_class_is_still_validated() {
        let request =
            DiscoveryRequest::all().exclude_class_name(Regex::new("Filtered").unwrap());
        let definition = basic_definition("FilteredTest")
            .before_all("setup", |_, _| async { Ok(()) })
            .before_all("setup", |_, _| async { Ok(()) });

        let error = resolve(
            &engine_context(Configuration::new()),
            &[definition],
            &request,
        )
        .unwrap_err();
        assert!(error.to_string().contains("duplicate beforeAll"));
    }

    #[test]
    fn test_supplier_runs_before_filtering() {
        let invocations = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = invocations.clone();

        let request =
            DiscoveryRequest::all().exclude_class_name(Regex::new("Filtered").unwrap());
        let definition = TestClassDefinition::new("FilteredTest")
            .argument_supplier(move |_| {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(Some(Arguments::values([0u8])))
            })
            .test("t", |_, _| async { Ok(()) });

        let tree = resolve(
            &engine_context(Configuration::new()),
            &[definition],
            &request,
        )
        .unwrap();

        // The supplier was invoked even though the class was pruned.
        assert!(tree.classes().is_empty());
        assert_eq!(invocations.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tag_filter() {
        let request = DiscoveryRequest::all().include_tag("integration");
        let tree = resolve(
            &engine_context(Configuration::new()),
            &[
                basic_definition("A").tag("integration"),
                basic_definition("B").tag("unit"),
            ],
            &request,
        )
        .unwrap();

        assert_eq!(tree.classes().len(), 1);
        assert_eq!(tree.classes()[0].class_name(), "A");
    }

    #[test]
    fn test_argument_parallelism_clamped_to_ceiling() {
        let configuration = Configuration::new().with(keys::ARGUMENT_PARALLELISM, "2");
        let definition = basic_definition("T").argument_parallelism(16);

        let tree = resolve_all(configuration, &[definition]).unwrap();
        assert_eq!(tree.classes()[0].argument_parallelism(), 2);
    }

    #[test]
    fn test_single_argument_shape() {
        let definition = TestClassDefinition::new("T")
            .argument_supplier(|_| Ok(Some(Arguments::single(Argument::new("only", 7u32)))))
            .test("t", |_, _| async { Ok(()) });

        let tree = resolve_all(Configuration::new(), &[definition]).unwrap();
        let arguments = tree.classes()[0].arguments();
        assert_eq!(arguments.len(), 1);
        assert_eq!(arguments[0].display_name(), "only");
    }
}
