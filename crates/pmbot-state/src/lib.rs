//! Small persisted tables shared by the bot runtimes.
//!
//! Each store loads once at startup and flushes on every acknowledged write.
//! An unreadable file is logged and replaced by an empty table so the
//! schedulers keep running.

mod identity_mapping_store;
mod report_flag_store;

pub use identity_mapping_store::IdentityMappingStore;
pub use report_flag_store::ReportFlagStore;

pub const IDENTITY_MAPPINGS_FILE: &str = "identity-mappings.json";
pub const REPORT_FLAGS_FILE: &str = "report-flags.json";

pub(crate) fn load_versioned<T>(path: &std::path::Path, label: &str, schema_version: u32) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned + Default + Versioned,
{
    let Some(raw) = pmbot_core::read_text_if_exists(path)? else {
        return Ok(T::default());
    };
    match serde_json::from_str::<T>(&raw) {
        Ok(state) if state.schema_version() == schema_version => Ok(state),
        Ok(state) => {
            tracing::error!(
                path = %path.display(),
                found = state.schema_version(),
                expected = schema_version,
                "unsupported {label} schema; starting empty"
            );
            Ok(T::default())
        }
        Err(error) => {
            tracing::error!(
                path = %path.display(),
                error = %error,
                "{label} file is corrupt; starting empty"
            );
            Ok(T::default())
        }
    }
}

pub(crate) trait Versioned {
    fn schema_version(&self) -> u32;
}
