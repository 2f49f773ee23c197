// SPDX-License-Identifier: GPL-3.0-only

use vergen::EmitBuilder;

// Exposes VERGEN_GIT_SHA and VERGEN_GIT_COMMIT_DATE to the startup log
fn main() -> Result<(), Box<dyn std::error::Error>> {
    EmitBuilder::builder()
        .git_sha(true)
        .git_commit_date()
        .emit()?;
    Ok(())
}
