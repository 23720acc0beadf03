//! Compressed-image encoding with cwebp.

use std::path::Path;

use amur_common::paths::{compressed_sibling, is_compressed};

use super::{extension_lower, settle, Conversion};
use crate::command::ToolCommand;
use crate::output::AtomicOutput;
use crate::tools::ToolRegistry;
use crate::{Error, Result};

/// Source extensions accepted by [`encode_webp`], lowercase.
pub const ENCODABLE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Encode `source` into its `{stem}.webp` sibling.
///
/// Sources already in the compressed format are a no-op. Repeated or
/// concurrent calls each stage their own temporary, so the last one to
/// finish wins and the sibling is never observed half-written.
pub async fn encode_webp(tools: &ToolRegistry, source: &Path) -> Result<Conversion> {
    if is_compressed(source) {
        return Ok(Conversion::NoOp);
    }

    match extension_lower(source) {
        Some(ext) if ENCODABLE_EXTENSIONS.contains(&ext.as_str()) => {}
        _ => {
            return Err(Error::Unsupported(format!(
                "cannot encode {} to webp",
                source.display()
            )))
        }
    }

    if !source.is_file() {
        return Err(Error::file_not_found(source));
    }

    let cwebp = tools.require("cwebp")?;
    let dest = compressed_sibling(source);
    let staged = AtomicOutput::new(&dest)?;

    tracing::debug!(source = %source.display(), dest = %dest.display(), "Encoding webp");

    let result = async {
        ToolCommand::for_tool(cwebp)
            .path_arg(source)
            .arg("-o")
            .path_arg(staged.path())
            .execute()
            .await?;
        staged.commit()
    }
    .await;

    settle(&dest, result)
}
