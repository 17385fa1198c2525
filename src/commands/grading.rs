//! Intake and grading commands.

use std::path::{Path, PathBuf};

use super::{render_result, DisplayOptions};
use crate::core_state::CoreState;
use crate::pipeline::intake::load_sources;
use crate::pipeline::preprocess::PreparedImage;

/// Prepare `paths` and, with `out_dir`, write each page as a JPEG.
pub async fn prepare_images(
    state: &CoreState,
    paths: &[PathBuf],
    out_dir: Option<&Path>,
) -> Result<String, String> {
    add_paths(state, paths).await?;
    let images = state.images().map_err(|e| e.user_message())?;

    let mut out = String::new();
    if let Some(notice) = state.notice().map_err(|e| e.user_message())? {
        out.push_str(&format!("{notice}\n"));
    }

    if let Some(dir) = out_dir {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Could not create {}: {e}", dir.display()))?;
    }

    for (i, image) in images.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}. {} -> {}x{}",
            i + 1,
            image.source_name,
            image.width,
            image.height
        ));
        if let Some(dir) = out_dir {
            let path = write_prepared(dir, i, image)?;
            out.push_str(&format!(" ({})", path.display()));
        }
        out.push('\n');
    }
    Ok(out)
}

/// Prepare `paths`, grade them in one call and render the result.
pub async fn grade_files(
    state: &CoreState,
    paths: &[PathBuf],
    options: &DisplayOptions,
) -> Result<String, String> {
    add_paths(state, paths).await?;
    let result = state.start_grading().await.map_err(|e| e.user_message())?;
    render_result(&result, options)
}

async fn add_paths(state: &CoreState, paths: &[PathBuf]) -> Result<usize, String> {
    let files = load_sources(paths).map_err(|e| e.to_string())?;
    state.add_files(files).await.map_err(|e| e.user_message())
}

/// `<dir>/<NN>-<source stem>.jpg`
fn write_prepared(dir: &Path, index: usize, image: &PreparedImage) -> Result<PathBuf, String> {
    let stem = Path::new(&image.source_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("page");
    let path = dir.join(format!("{:02}-{stem}.jpg", index + 1));

    let bytes = image
        .jpeg_bytes()
        .map_err(|e| format!("Corrupt prepared image {}: {e}", image.id))?;
    std::fs::write(&path, bytes).map_err(|e| format!("Could not write {}: {e}", path.display()))?;
    Ok(path)
}
