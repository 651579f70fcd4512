//! Shared fixtures for the test suites of every crate in the workspace.

pub fn create_temp_dir() -> anyhow::Result<std::path::PathBuf> {
    let mut idx = 0;
    loop {
        let tmp_dir = std::env::temp_dir().join(format!("ferry_test{}", &idx));
        if let Err(error) = std::fs::create_dir(&tmp_dir) {
            match error.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    idx += 1;
                }
                _ => return Err(error.into()),
            }
        } else {
            return Ok(tmp_dir);
        }
    }
}

/// Builds a small source tree for transfer tests:
///
/// ```text
/// tree
/// |- 0.txt
/// |- docs
///    |- 1.txt
///    |- 2.txt
///    |- 3.txt
/// |- media
///    |- 4.bin
///    |- 5.bin
/// ```
pub async fn setup_source_tree() -> anyhow::Result<std::path::PathBuf> {
    let tmp_dir = create_temp_dir()?;
    let tree_path = tmp_dir.join("tree");
    tokio::fs::create_dir(&tree_path).await?;
    tokio::fs::write(tree_path.join("0.txt"), "0").await?;
    let docs_path = tree_path.join("docs");
    tokio::fs::create_dir(&docs_path).await?;
    tokio::fs::write(docs_path.join("1.txt"), "1").await?;
    tokio::fs::write(docs_path.join("2.txt"), "2").await?;
    tokio::fs::write(docs_path.join("3.txt"), "3").await?;
    let media_path = tree_path.join("media");
    tokio::fs::create_dir(&media_path).await?;
    tokio::fs::write(media_path.join("4.bin"), vec![4u8; 2048]).await?;
    tokio::fs::write(media_path.join("5.bin"), vec![5u8; 4096]).await?;
    Ok(tmp_dir)
}

pub async fn read_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Vec<u8>> {
    Ok(tokio::fs::read(path).await?)
}

/// Progress observer that records every `(bytes, total)` report.
pub fn recording_reporter() -> (
    crate::progress::Reporter,
    std::sync::Arc<std::sync::Mutex<Vec<(u64, u64)>>>,
) {
    let calls = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = calls.clone();
    let reporter = crate::progress::Reporter::new(std::sync::Arc::new(
        move |bytes: u64, total: u64, _elapsed: std::time::Duration| {
            sink.lock().unwrap().push((bytes, total));
        },
    ));
    (reporter, calls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn source_tree_has_the_documented_shape() -> anyhow::Result<()> {
        let tmp_dir = setup_source_tree().await?;
        let tree_path = tmp_dir.join("tree");
        assert_eq!(read_file(tree_path.join("0.txt")).await?, b"0");
        assert_eq!(read_file(tree_path.join("docs/3.txt")).await?, b"3");
        assert_eq!(read_file(tree_path.join("media/5.bin")).await?.len(), 4096);
        tokio::fs::remove_dir_all(&tmp_dir).await?;
        Ok(())
    }
}
