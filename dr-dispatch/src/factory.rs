//! Routes filenames to at most one [`DispatcherWrapper`] per type.

use std::collections::BTreeMap;
use std::path::PathBuf;

use dr_core::filename::timestamp_and_suffix;
use dr_core::DispatcherType;

use crate::dispatcher::DispatcherProvider;
use crate::error::DispatchError;
use crate::wrapper::DispatcherWrapper;

/// Per-message wrapper cache. Wrappers are created on first use; later files of
/// the same type accumulate on the existing wrapper.
pub struct DispatcherWrapperFactory<'p> {
    provider: &'p dyn DispatcherProvider,
    source_dir: PathBuf,
    wrappers: BTreeMap<DispatcherType, DispatcherWrapper>,
}

impl<'p> DispatcherWrapperFactory<'p> {
    pub fn new(provider: &'p dyn DispatcherProvider, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            source_dir: source_dir.into(),
            wrappers: BTreeMap::new(),
        }
    }

    /// The wrapper for `dispatcher_type`, created if needed.
    pub fn wrapper_for_type(&mut self, dispatcher_type: DispatcherType) -> &mut DispatcherWrapper {
        let provider = self.provider;
        let source_dir = &self.source_dir;
        self.wrappers.entry(dispatcher_type).or_insert_with(|| {
            tracing::debug!(%dispatcher_type, "creating dispatcher wrapper");
            DispatcherWrapper::new(dispatcher_type, provider.create(dispatcher_type), source_dir)
        })
    }

    /// Wrapper for the type whose conventional suffix is `suffix`.
    ///
    /// `filename` names the offending file in the error.
    pub fn wrapper_for_suffix(
        &mut self,
        suffix: &str,
        filename: &str,
    ) -> Result<&mut DispatcherWrapper, DispatchError> {
        let dispatcher_type =
            DispatcherType::from_suffix(suffix).ok_or_else(|| DispatchError::UnrecognizedFile {
                filename: filename.to_string(),
            })?;
        Ok(self.wrapper_for_type(dispatcher_type))
    }

    /// Wrapper for one data file: non-conforming names first, then the suffix
    /// after the embedded timestamp.
    pub fn wrapper_for_file(&mut self, filename: &str) -> Result<&mut DispatcherWrapper, DispatchError> {
        if let Some(dispatcher_type) = DispatcherType::from_nonconforming_file_name(filename) {
            return Ok(self.wrapper_for_type(dispatcher_type));
        }
        match timestamp_and_suffix(filename) {
            Some((_, suffix)) => self.wrapper_for_suffix(suffix, filename),
            None => Err(DispatchError::UnrecognizedFile {
                filename: filename.to_string(),
            }),
        }
    }

    /// Wrapper for a whole-message type selected by the message filename.
    pub fn wrapper_for_manifest(
        &mut self,
        manifest_name: &str,
    ) -> Result<&mut DispatcherWrapper, DispatchError> {
        let dispatcher_type = DispatcherType::from_manifest_name(manifest_name).ok_or_else(|| {
            DispatchError::UnrecognizedManifest {
                filename: manifest_name.to_string(),
            }
        })?;
        Ok(self.wrapper_for_type(dispatcher_type))
    }

    pub fn len(&self) -> usize {
        self.wrappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }

    pub fn into_wrappers(self) -> BTreeMap<DispatcherType, DispatcherWrapper> {
        self.wrappers
    }
}
