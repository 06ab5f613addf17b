//! Block dispatcher
//!
//! A block runs as one transaction set: every write in the block is staged,
//! and the set commits only when every command succeeded. The session cache
//! is flushed after every block so the next one re-samples hardware.

use std::sync::Arc;

use super::commands::{lookup, CommandKind, COMMANDS};
use super::quoting;
use crate::error::{Error, Result};
use crate::hooks::{DownloadOutcome, DownloadRequest, Downloader, SessionTrigger};
use crate::tree::{SessionCache, TransactionSet, Tree};

/// What the connection should do after a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Write these records, keep reading
    Reply(Vec<Vec<String>>),
    /// Write these records, then close the connection
    ReplyAndClose(Vec<Vec<String>>),
    /// Close this connection without a reply
    Close,
    /// Stop the whole process
    Shutdown,
}

enum Flow {
    Done(Vec<Vec<String>>),
    Quit,
    Shutdown,
}

/// Owns the tree and the session cache; one block at a time
pub struct Dispatcher {
    tree: Tree,
    cache: SessionCache,
    downloader: Option<Arc<dyn Downloader>>,
    session_trigger: Option<Arc<dyn SessionTrigger>>,
}

impl Dispatcher {
    pub fn new(tree: Tree) -> Self {
        Self {
            tree,
            cache: SessionCache::new(),
            downloader: None,
            session_trigger: None,
        }
    }

    pub fn with_downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    pub fn with_session_trigger(mut self, trigger: Arc<dyn SessionTrigger>) -> Self {
        self.session_trigger = Some(trigger);
        self
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    /// Session boundary: drop every cached hardware read
    pub fn flush_cache(&mut self) {
        self.cache.flush();
    }

    pub fn cache_generation(&self) -> u64 {
        self.cache.generation()
    }

    /// Split raw lines and process them as one block
    pub fn process_lines(&mut self, lines: &[String]) -> BlockOutcome {
        let split: Result<Vec<Vec<String>>> = lines.iter().map(|l| quoting::split(l)).collect();
        match split {
            Ok(commands) => self.process_block(&commands),
            Err(e) => {
                self.cache.flush();
                tracing::warn!(error = %e, "Malformed block");
                BlockOutcome::ReplyAndClose(vec![error_record(&e)])
            }
        }
    }

    /// Process one block of split command lines
    pub fn process_block(&mut self, commands: &[Vec<String>]) -> BlockOutcome {
        let result = self.run_block(commands);
        self.cache.flush();
        match result {
            Ok(Flow::Done(rows)) => {
                let mut out = Vec::with_capacity(rows.len() + 1);
                out.push(vec!["OK".to_string()]);
                out.extend(rows);
                BlockOutcome::Reply(out)
            }
            Ok(Flow::Quit) => BlockOutcome::Close,
            Ok(Flow::Shutdown) => BlockOutcome::Shutdown,
            Err(e) => {
                tracing::warn!(code = e.code(), error = %e, "Block failed");
                if e.is_connection_fatal() {
                    BlockOutcome::ReplyAndClose(vec![error_record(&e)])
                } else {
                    BlockOutcome::Reply(vec![error_record(&e)])
                }
            }
        }
    }

    fn run_block(&mut self, commands: &[Vec<String>]) -> Result<Flow> {
        if commands.is_empty() {
            return Err(Error::Dispatch("try the \"help\" command".to_string()));
        }

        let cache = &mut self.cache;
        let mut set = TransactionSet::new(&mut self.tree);
        let mut rows: Vec<Vec<String>> = Vec::new();

        for words in commands {
            let (name, args) = words
                .split_first()
                .ok_or_else(|| Error::Dispatch("empty command".to_string()))?;
            let spec = lookup(name)?;
            spec.check_args(args)?;
            tracing::debug!(command = %name, args = args.len(), "Dispatching command");

            let path = args.first().map(String::as_str).unwrap_or("");
            match spec.kind {
                CommandKind::Get => {
                    let value = set.tree().get_export(path, cache)?;
                    rows.push(vec![path.to_string(), value.to_string()]);
                }
                CommandKind::Set => {
                    for pair in args.chunks(2) {
                        set.set(&pair[0], &pair[1], cache)?;
                        rows.push(pair.to_vec());
                    }
                }
                CommandKind::List | CommandKind::Rlist => {
                    let recursive = spec.kind == CommandKind::Rlist;
                    let exports = set.tree().list_exports(path, recursive, cache)?;
                    rows.extend(exports.into_iter().map(|e| e.into_row()));
                }
                CommandKind::Validate => set.tree().validate_exports(path)?,
                CommandKind::Add => {
                    let index = args.get(1).map(|i| parse_index(i)).transpose()?;
                    let index = set.tree().add_export_object(path, index)?;
                    rows.push(vec![index.to_string()]);
                }
                CommandKind::Del => {
                    for raw in &args[1..] {
                        set.tree().delete_export_object(path, parse_index(raw)?)?;
                        rows.push(vec![raw.clone()]);
                    }
                }
                CommandKind::Download => {
                    let downloader = self
                        .downloader
                        .as_ref()
                        .ok_or_else(|| Error::InvalidState("no downloader configured".to_string()))?;
                    downloader.enqueue(DownloadRequest::image(path), Box::new(log_download))?;
                    rows.push(vec!["OK".to_string(), "Starting download.".to_string()]);
                }
                CommandKind::Wakeup => {
                    let trigger = self.session_trigger.as_ref().ok_or_else(|| {
                        Error::InvalidState("No state machine to wake up".to_string())
                    })?;
                    trigger.new_wakeup_session()?;
                    rows.push(vec!["OK".to_string(), "Starting wakeup session.".to_string()]);
                }
                CommandKind::Completions => {
                    rows.extend(set.tree().completions(path).into_iter().map(|n| vec![n]));
                }
                CommandKind::Help => {
                    rows.extend(
                        COMMANDS
                            .iter()
                            .map(|c| vec![c.name.to_string(), c.help.to_string()]),
                    );
                }
                CommandKind::Quit => {
                    if let Err(e) = set.commit() {
                        tracing::warn!(error = %e, "Commit before quit failed");
                    }
                    return Ok(Flow::Quit);
                }
                CommandKind::QuitQuitQuit => {
                    set.abandon();
                    return Ok(Flow::Shutdown);
                }
            }
        }

        let touched = set.touched().len();
        set.commit()?;
        if touched > 0 {
            tracing::debug!(objects = touched, "Block committed");
        }
        Ok(Flow::Done(rows))
    }
}

fn parse_index(raw: &str) -> Result<u32> {
    raw.parse()
        .map_err(|_| Error::Dispatch(format!("index must be a number, not {:?}", raw)))
}

fn log_download(outcome: DownloadOutcome) {
    if outcome.fault == 0 {
        tracing::info!(command_key = %outcome.command_key, "{}", outcome.message);
    } else {
        tracing::warn!(
            command_key = %outcome.command_key,
            fault = outcome.fault,
            "{}",
            outcome.message
        );
    }
}

/// `ERROR <code> <message>`
pub fn error_record(e: &Error) -> Vec<String> {
    vec!["ERROR".to_string(), e.code().to_string(), e.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::argv;
    use crate::tree::{ObjectSchema, ParamObject, ParamSpec, ParamType, ParamValue, SchemaRegistry};
    use std::sync::Mutex;

    fn dispatcher() -> Dispatcher {
        let sub = Arc::new(
            ObjectSchema::new("Sub").with_param(ParamSpec::read_write("Value", ParamType::Int)),
        );
        let root = ObjectSchema::new("Root")
            .with_param(ParamSpec::read_write("Test", ParamType::String))
            .with_param(ParamSpec::read_write("Count", ParamType::Int))
            .with_list("Sub", "Sub");
        let mut registry = SchemaRegistry::new();
        registry.register("Sub", move || Box::new(ParamObject::new(sub.clone())));
        let root = ParamObject::new(Arc::new(root)).with_value("Test", "this is a test string");
        Dispatcher::new(Tree::with_registry(Box::new(root), registry))
    }

    fn block(lines: &[&[&str]]) -> Vec<Vec<String>> {
        lines.iter().map(|l| argv(l)).collect()
    }

    fn reply(outcome: BlockOutcome) -> Vec<Vec<String>> {
        match outcome {
            BlockOutcome::Reply(rows) => rows,
            other => panic!("expected a reply, got {:?}", other),
        }
    }

    fn value(d: &mut Dispatcher, path: &str) -> ParamValue {
        let mut cache = SessionCache::new();
        d.tree_mut().get_export(path, &mut cache).unwrap()
    }

    #[test]
    fn test_get_and_set() {
        let mut d = dispatcher();
        let rows = reply(d.process_block(&block(&[
            &["set", "Test", "hello", "Count", "3"],
            &["get", "Test"],
        ])));
        assert_eq!(
            rows,
            block(&[&["OK"], &["Test", "hello"], &["Count", "3"], &["Test", "hello"]])
        );
        assert_eq!(value(&mut d, "Count"), ParamValue::Int(3));
    }

    #[test]
    fn test_failed_block_abandons_everything() {
        let mut d = dispatcher();
        let rows = reply(d.process_block(&block(&[
            &["set", "Test", "changed"],
            &["set", "Count", "many"],
            &["get", "Test"],
        ])));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "ERROR");
        assert_eq!(rows[0][1], "9007");
        assert_eq!(value(&mut d, "Test"), ParamValue::from("this is a test string"));
    }

    #[test]
    fn test_dispatch_errors() {
        let mut d = dispatcher();
        let rows = reply(d.process_block(&[]));
        assert_eq!(rows[0][1], "9003");
        assert!(rows[0][2].contains("help"));

        let rows = reply(d.process_block(&block(&[&["frobnicate"]])));
        assert_eq!(rows[0][1], "9000");

        let rows = reply(d.process_block(&block(&[&["del", "Sub"]])));
        assert_eq!(rows[0][1], "9003");

        let rows = reply(d.process_block(&block(&[&["get", "Nope"]])));
        assert_eq!(rows[0][1], "9005");

        let rows = reply(d.process_block(&block(&[&["wakeup"]])));
        assert_eq!(rows[0][2], "No state machine to wake up");
    }

    #[test]
    fn test_add_list_del() {
        let mut d = dispatcher();
        let rows = reply(d.process_block(&block(&[&["add", "Sub"], &["add", "Sub", "5"]])));
        assert_eq!(rows, block(&[&["OK"], &["1"], &["5"]]));

        let rows = reply(d.process_block(&block(&[&["list", "Sub"]])));
        assert_eq!(rows, block(&[&["OK"], &["Sub.1."], &["Sub.5."]]));

        let rows = reply(d.process_block(&block(&[&["del", "Sub", "1", "5"], &["ls"]])));
        assert_eq!(
            rows,
            block(&[
                &["OK"],
                &["1"],
                &["5"],
                &["Count", "0"],
                &["Test", "this is a test string"],
                &["Sub."],
            ])
        );
    }

    #[test]
    fn test_help_and_completions() {
        let mut d = dispatcher();
        let rows = reply(d.process_block(&block(&[&["help"]])));
        assert_eq!(rows.len(), COMMANDS.len() + 1);
        assert_eq!(rows[1][0], "add");

        let rows = reply(d.process_block(&block(&[&["completions", "s"]])));
        assert_eq!(rows, block(&[&["OK"], &["Sub."]]));
    }

    #[test]
    fn test_quit_commits_staged_writes() {
        let mut d = dispatcher();
        let outcome = d.process_block(&block(&[&["set", "Count", "7"], &["quit"], &["set", "Count", "8"]]));
        assert_eq!(outcome, BlockOutcome::Close);
        assert_eq!(value(&mut d, "Count"), ParamValue::Int(7));

        let outcome = d.process_block(&block(&[&["set", "Count", "9"], &["quitquitquit"]]));
        assert_eq!(outcome, BlockOutcome::Shutdown);
        assert_eq!(value(&mut d, "Count"), ParamValue::Int(7));
    }

    #[test]
    fn test_framing_error_closes() {
        let mut d = dispatcher();
        let generation = d.cache_generation();
        match d.process_lines(&argv(&["get 'Test"])) {
            BlockOutcome::ReplyAndClose(rows) => assert_eq!(rows[0][1], "9003"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(d.cache_generation() > generation);
    }

    struct RecordingDownloader(Mutex<Vec<DownloadRequest>>);

    impl Downloader for RecordingDownloader {
        fn enqueue(&self, request: DownloadRequest, _done: crate::hooks::DownloadCallback) -> Result<()> {
            self.0.lock().unwrap().push(request);
            Ok(())
        }
    }

    #[test]
    fn test_download_enqueues_image() {
        let downloader = Arc::new(RecordingDownloader(Mutex::new(Vec::new())));
        let mut d = dispatcher().with_downloader(downloader.clone());
        let rows = reply(d.process_block(&block(&[&["download", "http://fw/image.gi"]])));
        assert_eq!(rows, block(&[&["OK"], &["OK", "Starting download."]]));

        let requests = downloader.0.lock().unwrap();
        assert_eq!(requests[0], DownloadRequest::image("http://fw/image.gi"));
        assert_eq!(requests[0].target_filename, "rcmd.gi");
    }
}
