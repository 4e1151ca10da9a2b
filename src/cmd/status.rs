use crate::context::AppContext;
use crate::error::AppResult;
use crate::workflow::CommitSession;

pub async fn run(ctx: &AppContext, session: &mut CommitSession) -> AppResult<()> {
    let state = session.refresh_state().await?;

    println!("Repository: {}", state.repository.path().display());
    println!("Branch: {}", state.repository.branch_label());

    if state.changed_files.is_empty() {
        println!("Working tree clean.");
    } else {
        println!("Changed files ({}):", state.changed_files.len());
        for path in &state.changed_files {
            println!("  {path}");
        }
    }

    println!("Model: {} ({})", ctx.config.model, ctx.config.endpoint);
    if ctx.config.has_api_key() {
        println!("API key: configured");
    } else {
        println!("API key: not configured (run `aicommit config init`)");
    }

    Ok(())
}
