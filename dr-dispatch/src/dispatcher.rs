//! The boundary to domain-specific consumers.
//!
//! A [`Dispatcher`] ingests the files of one [`DispatcherType`]; the
//! [`DispatcherProvider`] builds one per type with a closed `match`. Every stored
//! file goes back through the [`FileSink`] handed to `dispatch`.

use std::collections::BTreeSet;
use std::path::Path;

use dr_core::filename::TimestampRange;
use dr_core::DispatcherType;

use crate::error::DispatchError;

/// Per-file-record sink provided by the wrapper for the duration of one dispatch.
pub trait FileSink {
    /// Store `filename` durably and record it against the current dispatch.
    fn store_file(&mut self, filename: &str) -> Result<(), DispatchError>;
}

/// Consumer of one category of data files.
pub trait Dispatcher: Send {
    fn dispatch(
        &mut self,
        filenames: &BTreeSet<String>,
        source_dir: &Path,
        sink: &mut dyn FileSink,
    ) -> Result<(), DispatchError>;
}

/// Builds the [`Dispatcher`] for a type.
pub trait DispatcherProvider: Send {
    fn create(&self, dispatcher_type: DispatcherType) -> Box<dyn Dispatcher>;
}

/// Reference-model metadata hook run after each successful dispatch.
pub trait ModelImporter: Send {
    fn import_models(
        &mut self,
        dispatcher_type: DispatcherType,
        range: Option<&TimestampRange>,
    ) -> Result<(), DispatchError>;
}

/// Importer for deployments without reference-model metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoModelImport;

impl ModelImporter for NoModelImport {
    fn import_models(
        &mut self,
        _dispatcher_type: DispatcherType,
        _range: Option<&TimestampRange>,
    ) -> Result<(), DispatchError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Standard dispatcher set
// ---------------------------------------------------------------------------

/// Verifies each file is present in the source directory and archives it.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveDispatcher {
    dispatcher_type: DispatcherType,
}

impl ArchiveDispatcher {
    pub fn new(dispatcher_type: DispatcherType) -> Self {
        Self { dispatcher_type }
    }
}

impl Dispatcher for ArchiveDispatcher {
    fn dispatch(
        &mut self,
        filenames: &BTreeSet<String>,
        source_dir: &Path,
        sink: &mut dyn FileSink,
    ) -> Result<(), DispatchError> {
        for filename in filenames {
            if !source_dir.join(filename).is_file() {
                return Err(DispatchError::dispatcher(
                    self.dispatcher_type,
                    format!("{filename} not found in {}", source_dir.display()),
                ));
            }
            sink.store_file(filename)?;
        }
        Ok(())
    }
}

/// The shipped provider. Domain decoders plug in here.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardDispatchers;

impl DispatcherProvider for StandardDispatchers {
    fn create(&self, dispatcher_type: DispatcherType) -> Box<dyn Dispatcher> {
        use DispatcherType::*;
        // Every type archives until a domain decoder takes over its variant.
        // Listed out so a new variant cannot be added without routing it.
        match dispatcher_type {
            ConfigMap | SpacecraftEphemeris | PlanetaryEphemeris | LeapSeconds | Sclk
            | RefPixel | Crct | Ffi | History | ClockStateMask | TargetList | TargetListSet
            | MaskTable | LongCadenceTargetPmrf | ShortCadenceTargetPmrf | BackgroundPmrf
            | LongCadenceCollateralPmrf | ShortCadenceCollateralPmrf | GapReport | Histogram
            | Ancillary | ThrusterData | DataAnomaly | LongCadencePixel | ShortCadencePixel
            | RclcPixel | UkirtImage => Box::new(ArchiveDispatcher::new(dispatcher_type)),
        }
    }
}
