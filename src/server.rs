//! Language server over stdio.
//!
//! Open documents are kept as ropes and reindexed on every change. Indexing
//! is blocking work and runs on the blocking pool; the index orders
//! concurrent reparses of a file itself, so a handler that loses the race
//! simply skips publishing. Documents without a file, such as notebook
//! cells, are indexed under a path derived from their URI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use ropey::Rope;
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::documents::{document_path, is_virtual};
use crate::index::{IndexOutcome, WorkspaceIndex};
use crate::logger::{LogEntry, LogSeverity, LogSink, TracingSink};
use crate::validators::ParseOptions;
use crate::{completion, diagnostics, gotodef, hover, references, semantic_tokens, symbol};

/// Logs through `tracing` and shows alerts to the user.
struct ClientSink {
    client: Client,
    runtime: Handle,
}

impl LogSink for ClientSink {
    fn log(&self, entry: LogEntry) {
        if let Some(alert) = entry.alert.clone() {
            let message_type = match entry.severity {
                Some(LogSeverity::Error) => MessageType::ERROR,
                Some(LogSeverity::Warning) => MessageType::WARNING,
                Some(LogSeverity::Info) | None => MessageType::INFO,
            };
            let client = self.client.clone();
            self.runtime.spawn(async move {
                client.show_message(message_type, alert).await;
            });
        }
        TracingSink.log(entry);
    }
}

struct Workspace {
    root: PathBuf,
    settings: Settings,
    index: Arc<WorkspaceIndex>,
}

pub struct Backend {
    client: Client,
    workspace: RwLock<Option<Arc<Workspace>>>,
    documents: DashMap<Url, Rope>,
}

impl Backend {
    pub fn new(client: Client) -> Backend {
        Backend {
            client,
            workspace: RwLock::new(None),
            documents: DashMap::new(),
        }
    }

    async fn workspace(&self) -> Option<Arc<Workspace>> {
        self.workspace.read().await.clone()
    }

    async fn bind_workspace<T>(
        &self,
        uri: &Url,
        callback: impl FnOnce(&Workspace, &Path) -> Option<T>,
    ) -> Option<T> {
        let workspace = self.workspace().await?;
        let path = document_path(uri)?;
        callback(&workspace, &path)
    }

    async fn publish_diagnostics(&self, workspace: &Workspace, uri: Url) {
        let Some(path) = document_path(&uri) else {
            return;
        };
        let published =
            diagnostics::diagnostics(&workspace.index, &workspace.settings, (&path, &uri));
        if let Some(diags) = published {
            self.client.publish_diagnostics(uri, diags, None).await;
        }
    }

    /// Publish every open document. Callers of a changed routine may have
    /// been revalidated by the commit.
    async fn publish_open_documents(&self, workspace: &Workspace) {
        let uris: Vec<Url> = self.documents.iter().map(|doc| doc.key().clone()).collect();
        for uri in uris {
            self.publish_diagnostics(workspace, uri).await;
        }
    }

    async fn reindex(&self, uri: &Url, text: String, options: ParseOptions) {
        let Some(workspace) = self.workspace().await else {
            return;
        };
        let Some(path) = document_path(uri) else {
            debug!(%uri, "skipping document without an index path");
            return;
        };

        let index = workspace.index.clone();
        let outcome =
            tokio::task::spawn_blocking(move || index.index_file_with(&path, &text, options)).await;
        match outcome {
            Ok(IndexOutcome::Committed(_)) => self.publish_open_documents(&workspace).await,
            Ok(IndexOutcome::Superseded { version }) => debug!(%uri, version, "reparse superseded"),
            Err(err) => warn!(%uri, "indexing task failed: {err}"),
        }
    }

    /// Bring a file that is not open back in line with the disk. Documents
    /// without a file are forgotten.
    async fn reload_from_disk(&self, uri: &Url) {
        let Some(workspace) = self.workspace().await else {
            return;
        };
        let Some(path) = document_path(uri) else {
            return;
        };

        let on_disk = if is_virtual(&path) {
            None
        } else {
            std::fs::read_to_string(&path).ok()
        };
        match on_disk {
            Some(text) => self.reindex(uri, text, ParseOptions::default()).await,
            None => {
                let index = workspace.index.clone();
                let removed = tokio::task::spawn_blocking(move || index.remove_file(&path)).await;
                if let Ok(Some(_)) = removed {
                    self.client.publish_diagnostics(uri.clone(), vec![], None).await;
                    self.publish_open_documents(&workspace).await;
                }
            }
        }
    }
}

/// Convert an LSP position to a char index of the rope, clamped to the end
/// of its line.
fn position_to_char(text: &Rope, position: Position) -> usize {
    let line = position.line as usize;
    if line >= text.len_lines() {
        return text.len_chars();
    }

    let line_start = text.line_to_char(line);
    let mut utf16 = 0;
    let mut chars = 0;
    for ch in text.line(line).chars() {
        if utf16 >= position.character as usize || ch == '\n' || ch == '\r' {
            break;
        }
        utf16 += ch.len_utf16();
        chars += 1;
    }
    line_start + chars
}

fn apply_change(text: &mut Rope, change: &TextDocumentContentChangeEvent) {
    match change.range {
        Some(range) => {
            let start = position_to_char(text, range.start);
            let end = position_to_char(text, range.end).max(start);
            text.remove(start..end);
            text.insert(start, &change.text);
        }
        None => *text = Rope::from_str(&change.text),
    }
}

#[allow(deprecated)]
fn workspace_root(params: &InitializeParams) -> Option<PathBuf> {
    params
        .workspace_folders
        .as_ref()
        .and_then(|folders| folders.first())
        .and_then(|folder| folder.uri.to_file_path().ok())
        .or_else(|| params.root_uri.as_ref().and_then(|uri| uri.to_file_path().ok()))
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let root = workspace_root(&params)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();
        let settings = match Settings::new(&root, &params.capabilities) {
            Ok(settings) => settings,
            Err(err) => {
                warn!("falling back to default settings: {err}");
                Settings::default()
            }
        };
        info!(root = %root.display(), "initializing");

        let sink = Arc::new(ClientSink {
            client: self.client.clone(),
            runtime: Handle::current(),
        });
        let index = Arc::new(WorkspaceIndex::with_sink(&settings, sink));
        let semantic_tokens_provider = settings.semantic_tokens.then(|| {
            SemanticTokensServerCapabilities::SemanticTokensOptions(SemanticTokensOptions {
                work_done_progress_options: Default::default(),
                legend: semantic_tokens::legend(),
                range: None,
                full: Some(SemanticTokensFullOptions::Bool(true)),
            })
        });

        *self.workspace.write().await = Some(Arc::new(Workspace {
            root,
            settings,
            index,
        }));

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::INCREMENTAL),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(true),
                        })),
                        ..Default::default()
                    },
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                references_provider: Some(OneOf::Left(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                workspace_symbol_provider: Some(OneOf::Left(true)),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(false),
                    trigger_characters: Some(vec![">".to_string(), "/".to_string()]),
                    ..Default::default()
                }),
                semantic_tokens_provider,
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "idl-index".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let Some(workspace) = self.workspace().await else {
            return;
        };

        let index = workspace.index.clone();
        let roots = vec![workspace.root.clone()];
        let summary =
            tokio::task::spawn_blocking(move || index.index_workspace(&roots, false)).await;
        match summary {
            Ok(Ok(summary)) => {
                self.client
                    .log_message(
                        MessageType::INFO,
                        format!(
                            "Indexed {} files, {} routines, {} problems",
                            summary.indexed.len(), summary.routines, summary.problems
                        ),
                    )
                    .await;
                self.publish_open_documents(&workspace).await;
            }
            Ok(Err(err)) => {
                self.client
                    .show_message(MessageType::ERROR, format!("Failed to index workspace: {err}"))
                    .await;
            }
            Err(err) => warn!("workspace indexing task failed: {err}"),
        }
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents
            .insert(uri.clone(), Rope::from_str(&params.text_document.text));
        self.reindex(&uri, params.text_document.text, ParseOptions::default())
            .await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let text = {
            let mut document = self.documents.entry(uri.clone()).or_default();
            for change in &params.content_changes {
                apply_change(&mut document, change);
            }
            document.to_string()
        };

        let post_process = match self.workspace().await {
            Some(workspace) => workspace.settings.post_process_on_change,
            None => true,
        };
        self.reindex(&uri, text, ParseOptions { post_process }).await;
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        let text = match params.text {
            Some(text) => {
                self.documents.insert(uri.clone(), Rope::from_str(&text));
                Some(text)
            }
            None => self.documents.get(&uri).map(|doc| doc.to_string()),
        };

        match text {
            Some(text) => self.reindex(&uri, text, ParseOptions::default()).await,
            None => self.reload_from_disk(&uri).await,
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.remove(&uri);
        self.reload_from_disk(&uri).await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        for change in params.changes {
            if !self.documents.contains_key(&change.uri) {
                self.reload_from_disk(&change.uri).await;
            }
        }
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let position = params.text_document_position_params.position;
        let uri = params.text_document_position_params.text_document.uri;
        Ok(self
            .bind_workspace(&uri, |workspace, path| {
                hover::hover(&workspace.index, position, path, &workspace.settings)
            })
            .await)
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let position = params.text_document_position_params.position;
        let uri = params.text_document_position_params.text_document.uri;
        Ok(self
            .bind_workspace(&uri, |workspace, path| {
                gotodef::goto_definition(&workspace.index, position, path)
                    .map(GotoDefinitionResponse::Array)
            })
            .await)
    }

    async fn references(&self, params: ReferenceParams) -> Result<Option<Vec<Location>>> {
        let position = params.text_document_position.position;
        let uri = params.text_document_position.text_document.uri;
        Ok(self
            .bind_workspace(&uri, |workspace, path| {
                references::references(&workspace.index, position, path)
            })
            .await)
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let position = params.text_document_position.position;
        let uri = params.text_document_position.text_document.uri;
        Ok(self
            .bind_workspace(&uri, |workspace, path| {
                completion::get_completions(&workspace.index, position, path, &workspace.settings)
            })
            .await)
    }

    async fn semantic_tokens_full(
        &self,
        params: SemanticTokensParams,
    ) -> Result<Option<SemanticTokensResult>> {
        let Some(workspace) = self.workspace().await else {
            return Ok(None);
        };
        Ok(semantic_tokens::semantic_tokens_full(
            &workspace.index,
            &params.text_document.uri,
            &workspace.settings,
        ))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        Ok(self
            .bind_workspace(&params.text_document.uri, |workspace, path| {
                symbol::document_symbol(&workspace.index, path)
            })
            .await)
    }

    async fn symbol(
        &self,
        params: WorkspaceSymbolParams,
    ) -> Result<Option<Vec<SymbolInformation>>> {
        let Some(workspace) = self.workspace().await else {
            return Ok(None);
        };
        Ok(symbol::workspace_symbol(&workspace.index, &params.query))
    }
}

/// Serve the language server over stdin/stdout until the client exits.
pub async fn serve() {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_workspace_dir, write_file};

    const CELL: &str = "vscode-notebook-cell:/home/user/analysis.idlnb#W0sZmlsZQ%3D%3D";

    fn at(uri: &Url, line: u32, character: u32) -> TextDocumentPositionParams {
        TextDocumentPositionParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            position: Position { line, character },
        }
    }

    /// Test: notebook cells answer hover, definition and completion, but not
    /// semantic tokens
    #[tokio::test]
    async fn test_notebook_cell_queries() {
        let (_temp_dir, root) = create_test_workspace_dir();
        let plot_it = write_file(
            &root,
            "plot_it.pro",
            "pro plot_it, x, COLOR=color\n  print, x, color\nend\n",
        );

        let (service, _socket) = LspService::new(Backend::new);
        let backend = service.inner();
        backend
            .initialize(InitializeParams {
                workspace_folders: Some(vec![WorkspaceFolder {
                    uri: Url::from_file_path(&root).unwrap(),
                    name: "workspace".to_string(),
                }]),
                ..Default::default()
            })
            .await
            .unwrap();
        backend.initialized(InitializedParams {}).await;

        let cell = Url::parse(CELL).unwrap();
        backend
            .did_open(DidOpenTextDocumentParams {
                text_document: TextDocumentItem {
                    uri: cell.clone(),
                    language_id: "idl".to_string(),
                    version: 1,
                    text: "plot_it, 1, COLOR=2\n".to_string(),
                },
            })
            .await;

        let hovered = backend
            .hover(HoverParams {
                text_document_position_params: at(&cell, 0, 2),
                work_done_progress_params: Default::default(),
            })
            .await
            .unwrap();
        assert!(hovered.is_some());

        let definition = backend
            .goto_definition(GotoDefinitionParams {
                text_document_position_params: at(&cell, 0, 2),
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
            })
            .await
            .unwrap();
        let Some(GotoDefinitionResponse::Array(locations)) = definition else {
            panic!("expected a definition");
        };
        assert_eq!(locations[0].uri, Url::from_file_path(&plot_it).unwrap());

        let completions = backend
            .completion(CompletionParams {
                text_document_position: at(&cell, 0, 4),
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
                context: None,
            })
            .await
            .unwrap();
        let Some(CompletionResponse::List(list)) = completions else {
            panic!("expected completions");
        };
        assert!(list.items.iter().any(|item| item.label == "plot_it"));

        let tokens = backend
            .semantic_tokens_full(SemanticTokensParams {
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
                text_document: TextDocumentIdentifier { uri: cell.clone() },
            })
            .await
            .unwrap();
        assert!(tokens.is_none());

        backend
            .did_close(DidCloseTextDocumentParams {
                text_document: TextDocumentIdentifier { uri: cell.clone() },
            })
            .await;
        let workspace = backend.workspace().await.unwrap();
        assert!(workspace.index.get_file(&document_path(&cell).unwrap()).is_none());
    }

    fn change(start: (u32, u32), end: (u32, u32), text: &str) -> TextDocumentContentChangeEvent {
        TextDocumentContentChangeEvent {
            range: Some(Range {
                start: Position {
                    line: start.0,
                    character: start.1,
                },
                end: Position {
                    line: end.0,
                    character: end.1,
                },
            }),
            range_length: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_incremental_changes() {
        let mut text = Rope::from_str("pro a\n  x = 1\nend\n");

        apply_change(&mut text, &change((1, 2), (1, 3), "total"));
        assert_eq!(text.to_string(), "pro a\n  total = 1\nend\n");

        apply_change(&mut text, &change((1, 11), (1, 11), "\n  print, total"));
        assert_eq!(text.to_string(), "pro a\n  total = 1\n  print, total\nend\n");
    }

    /// Test: positions past the end of a line clamp to the line end
    #[test]
    fn test_position_clamps_to_line() {
        let text = Rope::from_str("ab\ncd\n");
        assert_eq!(position_to_char(&text, Position { line: 0, character: 10 }), 2);
        assert_eq!(position_to_char(&text, Position { line: 1, character: 1 }), 4);
        assert_eq!(position_to_char(&text, Position { line: 5, character: 0 }), 6);
    }

    #[test]
    fn test_full_replacement() {
        let mut text = Rope::from_str("old\n");
        apply_change(
            &mut text,
            &TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text: "new\n".to_string(),
            },
        );
        assert_eq!(text.to_string(), "new\n");
    }
}
