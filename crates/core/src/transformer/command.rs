//! Transformer backed by an external program.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

use super::config::CommandConfig;
use super::error::TransformerError;
use super::traits::Transformer;
use super::types::TransformRequest;

/// Longest stderr excerpt kept in a failure message.
const STDERR_EXCERPT_BYTES: usize = 2048;

/// Runs the configured program once per item.
///
/// The item content is written to `<scratch>/input/<identifier>` and the
/// recipe to `<scratch>/recipe.txt` before the program starts. The child is
/// killed if the call is dropped, e.g. on timeout.
pub struct CommandTransformer {
    config: CommandConfig,
}

impl CommandTransformer {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CommandConfig {
        &self.config
    }

    fn build_args(&self, paths: &ScratchPaths, identifier: &str) -> Vec<String> {
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &paths.input.to_string_lossy())
                    .replace("{output}", &paths.output.to_string_lossy())
                    .replace("{recipe}", &paths.recipe.to_string_lossy())
                    .replace("{scratch}", &paths.root.to_string_lossy())
                    .replace("{identifier}", identifier)
            })
            .collect()
    }

    fn not_found(&self) -> TransformerError {
        TransformerError::ProgramNotFound {
            path: self.config.program.clone(),
        }
    }
}

/// File layout inside one scratch directory.
struct ScratchPaths {
    root: PathBuf,
    input: PathBuf,
    output: PathBuf,
    recipe: PathBuf,
}

impl ScratchPaths {
    fn new(scratch_dir: &Path, identifier: &str) -> Self {
        let relative = safe_relative(identifier);
        Self {
            root: scratch_dir.to_path_buf(),
            input: scratch_dir.join("input").join(&relative),
            output: scratch_dir.join("output").join(&relative),
            recipe: scratch_dir.join("recipe.txt"),
        }
    }

    async fn prepare(&self, content: &[u8], policy: &str) -> Result<(), TransformerError> {
        for path in [&self.input, &self.output] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(&self.input, content).await?;
        fs::write(&self.recipe, policy).await?;
        Ok(())
    }
}

/// Keeps only normal components so identifiers cannot escape the scratch dir.
fn safe_relative(identifier: &str) -> PathBuf {
    let relative: PathBuf = Path::new(identifier)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();

    if relative.as_os_str().is_empty() {
        PathBuf::from("item")
    } else {
        relative
    }
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_EXCERPT_BYTES {
        return text.to_string();
    }
    let mut end = STDERR_EXCERPT_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Whether `program` can be found, either as a path or on `PATH`.
fn program_exists(program: &Path) -> bool {
    if program.components().count() > 1 || program.is_absolute() {
        return program.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

#[async_trait]
impl Transformer for CommandTransformer {
    fn name(&self) -> &str {
        "command"
    }

    async fn invoke(&self, request: TransformRequest<'_>) -> Result<Vec<u8>, TransformerError> {
        let paths = ScratchPaths::new(request.scratch_dir, request.identifier);
        paths.prepare(&request.content, request.policy).await?;
        drop(request.content);

        let args = self.build_args(&paths, request.identifier);
        debug!(
            program = %self.config.program.display(),
            identifier = %request.identifier,
            "Running transformer command"
        );

        let output = Command::new(&self.config.program)
            .args(&args)
            .envs(&self.config.env)
            .current_dir(&paths.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    self.not_found()
                } else {
                    TransformerError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(TransformerError::CommandFailed {
                status: output.status.code(),
                stderr: stderr_excerpt(&output.stderr),
            });
        }

        if !self.config.writes_output_file() {
            return Ok(output.stdout);
        }

        match fs::read(&paths.output).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TransformerError::OutputMissing {
                    path: paths.output.clone(),
                })
            }
            Err(e) => Err(TransformerError::Io(e)),
        }
    }

    async fn validate(&self) -> Result<(), TransformerError> {
        if self.config.validate_args.is_empty() {
            return if program_exists(&self.config.program) {
                Ok(())
            } else {
                Err(self.not_found())
            };
        }

        let output = Command::new(&self.config.program)
            .args(&self.config.validate_args)
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    self.not_found()
                } else {
                    TransformerError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(TransformerError::CommandFailed {
                status: output.status.code(),
                stderr: stderr_excerpt(&output.stderr),
            });
        }
        Ok(())
    }
}
