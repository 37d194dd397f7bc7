//! Shared test doubles for session and poller tests

#![allow(dead_code)]

use as2_core::ModuleSpec;
use as2_server::component::{Component, ComponentError, ProcessorModule};
use as2_server::poller::{ModuleContext, ModuleFactories, ModuleFactory};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const MOCK_TYPE: &str = "mock_poller";

/// Poller double that counts lifecycle calls.
///
/// Spec parameters `fail_destroy = "true"` and `panic_on_destroy = "true"`
/// make `destroy()` misbehave; `fail_start = "true"` makes `start()` fail.
pub struct MockPoller {
    pub name: String,
    pub params: BTreeMap<String, String>,
    pub starts: AtomicUsize,
    pub destroys: AtomicUsize,
}

impl MockPoller {
    pub fn destroy_count(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    fn flag(&self, key: &str) -> bool {
        self.params.get(key).map(String::as_str) == Some("true")
    }
}

impl Component for MockPoller {
    fn name(&self) -> &str {
        &self.name
    }

    fn destroy(&self) -> Result<(), ComponentError> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        if self.flag("panic_on_destroy") {
            panic!("{} exploded during destroy", self.name);
        }
        if self.flag("fail_destroy") {
            return Err(ComponentError::Destroy {
                component: self.name.clone(),
                message: "worker did not stop".to_string(),
                source: None,
            });
        }
        Ok(())
    }
}

impl ProcessorModule for MockPoller {
    fn parameters(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    fn is_active(&self) -> bool {
        true
    }

    fn start(&self) -> Result<(), ComponentError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.flag("fail_start") {
            return Err(ComponentError::Start {
                component: self.name.clone(),
                message: "outbox not writable".to_string(),
                source: None,
            });
        }
        Ok(())
    }
}

/// Every mock poller a factory table has built, in construction order
pub type Created = Arc<Mutex<Vec<Arc<MockPoller>>>>;

/// Factory table with the built-ins plus `mock_poller`
pub fn mock_factories() -> (ModuleFactories, Created) {
    let created: Created = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&created);

    let mut factories = ModuleFactories::with_builtins();
    factories.register(ModuleFactory {
        name: MOCK_TYPE.to_string(),
        description: "Counting poller for tests".to_string(),
        create: Arc::new(move |spec: &ModuleSpec, ctx: &ModuleContext| {
            let poller = Arc::new(MockPoller {
                name: format!("{MOCK_TYPE}[{}]", ctx.partnership),
                params: spec.string_parameters(),
                starts: AtomicUsize::new(0),
                destroys: AtomicUsize::new(0),
            });
            sink.lock().unwrap().push(Arc::clone(&poller));
            Ok(poller as Arc<dyn ProcessorModule>)
        }),
    });
    (factories, created)
}

pub fn mock_spec(outboxdir: &str) -> ModuleSpec {
    ModuleSpec::new(MOCK_TYPE).with_param("outboxdir", outboxdir)
}

pub fn module_ctx(partnership: &str) -> ModuleContext {
    ModuleContext {
        base_dir: PathBuf::from("/srv/as2"),
        partnership: partnership.to_string(),
        outbound: None,
    }
}

/// Plain component double for registry teardown
pub struct MockComponent {
    pub name: String,
    pub fail: bool,
    pub destroys: AtomicUsize,
}

impl MockComponent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            destroys: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    pub fn destroy_count(&self) -> usize {
        self.destroys.load(Ordering::SeqCst)
    }
}

impl Component for MockComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn destroy(&self) -> Result<(), ComponentError> {
        self.destroys.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ComponentError::Destroy {
                component: self.name.clone(),
                message: "still holding file handles".to_string(),
                source: None,
            });
        }
        Ok(())
    }
}
