//! Sequential concatenation fallback.
//!
//! Used when the layered mix cannot be produced: clips are joined back to back
//! with the concat demuxer and stream copy, with no timing or background.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use dubsync_models::clip_is_readable;

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{ensure_parent_dir, move_file, partial_path, remove_if_exists};
use crate::mix::MixRenderer;

/// Concatenate `clips` in order into `output`, skipping any that are missing.
///
/// Returns the number of clips joined.
pub async fn concatenate_clips(
    renderer: &dyn MixRenderer,
    clips: &[PathBuf],
    output: &Path,
) -> MediaResult<usize> {
    let mut present = Vec::with_capacity(clips.len());
    for clip in clips {
        if clip_is_readable(clip) {
            present.push(absolute(clip)?);
        } else {
            warn!(path = %clip.display(), "Skipping missing clip in concatenation");
        }
    }

    if present.is_empty() {
        return Err(MediaError::NoRenderableSegments);
    }

    let temp_dir = tempfile::tempdir()?;
    let list_path = temp_dir.path().join("concat.txt");
    tokio::fs::write(&list_path, concat_list(&present)).await?;

    let partial = partial_path(output);
    ensure_parent_dir(&partial).await?;

    let cmd = FfmpegCommand::new(&partial)
        .input_with_args(["-f", "concat", "-safe", "0"], &list_path)
        .codec_copy();

    if let Err(e) = renderer.render(&cmd).await {
        remove_if_exists(&partial).await;
        return Err(e);
    }

    if let Err(e) = move_file(&partial, output).await {
        remove_if_exists(&partial).await;
        return Err(e);
    }

    info!(
        clips = present.len(),
        skipped = clips.len() - present.len(),
        output = %output.display(),
        "Concatenated clips"
    );

    Ok(present.len())
}

/// Concat demuxer list: one `file '<path>'` line per clip.
fn concat_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
        .collect()
}

fn absolute(path: &Path) -> MediaResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingRenderer {
        lists: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MixRenderer for RecordingRenderer {
        async fn render(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
            let list = cmd
                .inputs()
                .next()
                .ok_or_else(|| MediaError::internal("no input"))?;
            let content = tokio::fs::read_to_string(list).await?;
            self.lists.lock().unwrap().push(content);
            tokio::fs::write(cmd.output(), b"joined").await?;
            Ok(())
        }
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[
            PathBuf::from("/clips/chunk_000.mp3"),
            PathBuf::from("/clips/it's.mp3"),
        ]);
        assert_eq!(
            list,
            "file '/clips/chunk_000.mp3'\nfile '/clips/it'\\''s.mp3'\n"
        );
    }

    #[tokio::test]
    async fn test_concatenate_skips_missing() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("chunk_000.mp3");
        let b = dir.path().join("chunk_001.mp3");
        std::fs::write(&a, b"a").unwrap();
        let output = dir.path().join("fallback.mp3");

        let renderer = RecordingRenderer::default();
        let joined = concatenate_clips(&renderer, &[a.clone(), b], &output)
            .await
            .unwrap();

        assert_eq!(joined, 1);
        assert!(output.exists());
        let lists = renderer.lists.lock().unwrap();
        assert_eq!(lists[0], format!("file '{}'\n", a.display()));
    }

    #[tokio::test]
    async fn test_concatenate_nothing_present() {
        let dir = TempDir::new().unwrap();
        let renderer = RecordingRenderer::default();
        let result = concatenate_clips(
            &renderer,
            &[dir.path().join("missing.mp3")],
            &dir.path().join("out.mp3"),
        )
        .await;
        assert!(matches!(result, Err(MediaError::NoRenderableSegments)));
    }
}
