//! vessel-host: extension loader and sandboxed component runtime
//!
//! Loads an extension's `.vue` component tree into a [`UiStore`] and runs its
//! script tree once, each file inside a fresh script engine that only sees
//! the capability modules built for that extension.

pub mod capability;
pub mod config;
pub mod contributions;
pub mod error;
pub mod executor;
pub mod fs;
mod markup;
pub mod runtime;
pub mod scripts;
pub mod sfc;
pub mod sinks;
pub mod store;
pub mod template;
pub mod transpile;
pub mod ui;
pub mod watcher;
pub mod widgets;

pub use capability::{
    Capability, CapabilityBuilder, CapabilityEnvironment, CapabilityModule, HostServices,
    ModuleProvider, ModuleScope,
};
pub use config::{ExecutorConfig, FailurePolicy, LoaderConfig, VesselConfig, WatchConfig};
pub use contributions::{Contribution, ContributionRegistry, ContributionScope};
pub use error::{ExtensionError, ExtensionResult};
pub use executor::{
    ExecutionMode, ScriptError, ScriptExecutor, ScriptOrigin, ScriptRequest, ScriptValue,
};
pub use fs::{MemoryFs, NativeFs};
pub use runtime::{Activation, ExtensionRuntime, ReloadSummary};
pub use scripts::{ScriptLoadReport, ScriptLoader};
pub use sinks::{ErrorSink, MemoryStyleSink, RecordingErrorSink, StyleSink, TracingErrorSink};
pub use store::{ComponentDefinition, ComponentFactory, ComponentResult, UiStore};
pub use template::{MarkupCompiler, RenderUnit, TemplateCompiler};
pub use ui::UiLoader;
pub use watcher::ExtensionWatcher;
pub use widgets::ComponentRef;
pub use vessel_api::{
    DirectoryHandle, Disposable, DisposableList, Entry, ExtensionId, FileHandle, FileSystem,
    ScriptLanguage, StoreKey,
};
