//! Mode and model switches.
//!
//! Both replace the session's agent handle. The replacement is built first;
//! if that fails the old handle stays in place.

use agent_core::{AgentFactory, ChatMode, DeriveSpec, SwitchOptions};

use super::error::{Error, Result};
use super::session::{Session, SessionStore};

fn describe_switch(head: String, options: &SwitchOptions) -> String {
    let details = options.describe();
    if details.is_empty() {
        head
    } else {
        format!("{head} ({})", details.join(", "))
    }
}

/// Switch the session into `mode`, carrying transcript and files forward.
///
/// # Errors
///
/// Returns [`Error::Init`] if the new agent cannot be built.
pub async fn switch_mode(
    session: &mut Session,
    factory: &dyn AgentFactory,
    mode: ChatMode,
    options: SwitchOptions,
) -> Result<()> {
    let spec = DeriveSpec {
        edit_format: mode.edit_format(&factory.native_edit_format(session.model())),
        summarize_from: mode.summarizes_history(),
        options: options.clone(),
    };
    let edit_format = spec.edit_format.clone();

    let agent = factory
        .derive(session.agent(), spec)
        .await
        .map_err(|e| Error::Init(e.to_string()))?;

    let line = describe_switch(
        format!("Switched to {mode} mode with {edit_format} edit format"),
        &options,
    );
    tracing::info!(session_id = %session.id(), mode = %mode, edit_format = %edit_format, "switched mode");

    session.set_agent_mode(agent, mode, options);
    session.info(line);
    Ok(())
}

/// Switch the session to `model` with a wholly new agent handle.
///
/// Files are re-added one at a time; files the new agent refuses are logged
/// and dropped.
///
/// # Errors
///
/// Returns [`Error::Init`] if the new agent cannot be built.
pub async fn switch_model(session: &mut Session, store: &SessionStore, model: &str) -> Result<()> {
    let mut agent = store
        .create_agent(
            session.project_root(),
            model,
            session.mode(),
            session.options().clone(),
        )
        .await?;

    for file in session.files() {
        if let Err(e) = agent.add_file(&file) {
            tracing::warn!(session_id = %session.id(), file = %file, error = %e, "file not carried to new model");
        }
    }

    let line = describe_switch(format!("Switched model to {model}"), session.options());
    tracing::info!(session_id = %session.id(), model = %model, "switched model");

    session.set_agent_model(agent);
    session.info(line);
    Ok(())
}
