use std::path::Path;

use anyhow::anyhow;
use config::{Config, File};
use serde::Deserialize;
use tower_lsp::lsp_types::ClientCapabilities;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Glob patterns (matched against file names) selecting the files to index
    pub file_patterns: Vec<String>,
    pub hover: bool,
    pub semantic_tokens: bool,
    pub completion_limit: usize,
    /// Re-run the post-process pass on every edit instead of only on save
    pub post_process_on_change: bool,
    /// Problem codes that are never reported
    pub disabled_problems: Vec<u16>,
}

impl Settings {
    pub fn new(root_dir: &Path, capabilities: &ClientCapabilities) -> anyhow::Result<Settings> {
        let expanded = shellexpand::tilde("~/.config/idl-index/settings");
        let settings = Config::builder()
            .add_source(File::with_name(&expanded).required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.idl-index",
                    root_dir
                        .to_str()
                        .ok_or(anyhow!("Can't convert root_dir to str"))?
                ))
                .required(false),
            )
            .set_default("file_patterns", vec!["*.pro"])?
            .set_default("hover", true)?
            .set_default("semantic_tokens", true)?
            .set_default("completion_limit", 50)?
            .set_default("post_process_on_change", true)?
            .set_default("disabled_problems", Vec::<i64>::new())?
            .set_override_option(
                "semantic_tokens",
                capabilities.text_document.as_ref().and_then(|it| {
                    match it.semantic_tokens.is_none() {
                        true => Some(false),
                        false => None,
                    }
                }),
            )?
            .build()
            .map_err(|err| anyhow!("Build err: {err}"))?;

        let settings = settings.try_deserialize::<Settings>()?;

        anyhow::Ok(settings)
    }

    pub fn is_disabled(&self, code: u16) -> bool {
        self.disabled_problems.contains(&code)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            file_patterns: vec!["*.pro".to_string()],
            hover: true,
            semantic_tokens: true,
            completion_limit: 50,
            post_process_on_change: true,
            disabled_problems: Vec::new(),
        }
    }
}
