use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub(crate) fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

/// True when Ollama's model list carries `wanted`, with or without a tag.
pub(crate) fn model_is_installed(installed: &[String], wanted: &str) -> bool {
    let wanted = wanted.trim();
    installed.iter().any(|name| {
        name == wanted
            || name
                .strip_prefix(wanted)
                .is_some_and(|rest| rest.starts_with(':'))
    })
}
