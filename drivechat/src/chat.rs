//! Interactive terminal front end.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use drivechat_rag::{Answer, NO_RESULTS, RagPipeline};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::warn;

use crate::config::AppArgs;
use crate::services;

const PROMPT: &str = "Your question: ";
const GOODBYE: &str = "Goodbye!";

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Line(String),
    /// Ctrl-C or Ctrl-D.
    Exit,
}

/// A source of prompted input lines.
pub trait LineReader {
    fn read_line(&mut self, prompt: &str) -> anyhow::Result<Input>;
}

impl LineReader for DefaultEditor {
    fn read_line(&mut self, prompt: &str) -> anyhow::Result<Input> {
        match self.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.add_history_entry(line.as_str());
                }
                Ok(Input::Line(line))
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(Input::Exit),
            Err(e) => Err(e.into()),
        }
    }
}

/// Authenticate, index the drive and answer questions until the user quits.
pub async fn run(args: AppArgs) -> anyhow::Result<()> {
    println!("Initializing DriveChat...");

    println!("Authenticating with Google Drive...");
    let storage = services::connect_drive(&args)
        .await
        .context("Failed to authenticate with Google Drive")?;

    println!("Initializing vector store...");
    let store = services::open_store(&args)?;

    println!("Initializing Gemini...");
    let pipeline = services::build_pipeline(&args, store).context("Gemini initialization error")?;
    pipeline.initialize().await?;

    println!("\nProcessing files from Google Drive...");
    let indexing = pipeline.index_with_progress(
        storage,
        Arc::new(|position: usize, total: usize, name: &str| {
            println!("Processing {position}/{total}: {name}");
        }),
    );
    let report = tokio::select! {
        report = indexing => report.context("Error processing files")?,
        () = ctrl_c() => {
            println!("\n{GOODBYE}");
            return Ok(());
        }
    };
    println!("Indexed {} of {} files.", report.indexed(), report.listed);

    println!("\nReady! Ask me anything about your documents (or type 'quit' to exit):");
    let mut editor = DefaultEditor::new()?;
    question_loop(&pipeline, &mut editor, &mut std::io::stdout(), ctrl_c).await
}

/// Resolve on the next Ctrl-C delivered as a signal.
///
/// Never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Read questions from `reader` and write answers to `out` until the user quits.
///
/// `reader` blocks the current task while waiting for input; questions are
/// handled one at a time. A question still being answered when `interrupt`
/// resolves is abandoned and the loop ends as if the user had quit.
pub async fn question_loop<R, W, I, F>(
    pipeline: &RagPipeline,
    reader: &mut R,
    out: &mut W,
    interrupt: I,
) -> anyhow::Result<()>
where
    R: LineReader,
    W: Write,
    I: Fn() -> F,
    F: Future<Output = ()>,
{
    loop {
        let query = match reader.read_line(&format!("\n{PROMPT}"))? {
            Input::Exit => {
                writeln!(out, "\n{GOODBYE}")?;
                return Ok(());
            }
            Input::Line(line) => line.trim().to_string(),
        };

        if is_quit(&query) {
            writeln!(out, "{GOODBYE}")?;
            return Ok(());
        }
        if query.is_empty() {
            continue;
        }

        writeln!(out, "\nSearching for information...")?;
        let answer = tokio::select! {
            answer = pipeline.ask(&query) => answer,
            () = interrupt() => {
                writeln!(out, "\n{GOODBYE}")?;
                return Ok(());
            }
        };
        write!(out, "{}", render_answer(answer.as_ref()))?;
    }
}

fn is_quit(line: &str) -> bool {
    line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit")
}

/// Format an answer and its numbered sources for the terminal.
pub fn render_answer(answer: Option<&Answer>) -> String {
    let Some(answer) = answer else {
        return format!("{NO_RESULTS}\n");
    };

    let mut text = format!("\nAnswer:\n{}\n\nSources:\n", answer.text);
    for (i, source) in answer.sources.iter().enumerate() {
        text.push_str(&format!("{}. {} (score: {:.3})\n", i + 1, source.name, source.score));
    }
    text
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use drivechat_rag::{
        DriveFile, EmbeddingProvider, FileStorage, InMemoryVectorStore, RagConfig, Result,
        SearchResult, TextGenerator,
    };

    use super::*;

    struct Scripted(VecDeque<Input>);

    impl Scripted {
        fn lines(lines: &[&str]) -> Self {
            Self(lines.iter().map(|l| Input::Line(l.to_string())).collect())
        }
    }

    impl LineReader for Scripted {
        fn read_line(&mut self, _prompt: &str) -> anyhow::Result<Input> {
            Ok(self.0.pop_front().unwrap_or(Input::Exit))
        }
    }

    struct Unit;

    #[async_trait]
    impl EmbeddingProvider for Unit {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    struct Reply;

    #[async_trait]
    impl TextGenerator for Reply {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok("Quarterly planning notes.".into())
        }
    }

    struct OneFile;

    #[async_trait]
    impl FileStorage for OneFile {
        async fn list_files(&self) -> Result<Vec<DriveFile>> {
            Ok(vec![DriveFile::new("n1", "notes.txt", "text/plain")])
        }

        async fn export_text(&self, _file_id: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn download(&self, _file_id: &str) -> Result<Vec<u8>> {
            Ok(b"Notes from the quarterly planning meeting.".to_vec())
        }
    }

    /// A model that never answers.
    struct Stalled;

    #[async_trait]
    impl TextGenerator for Stalled {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            std::future::pending().await
        }
    }

    async fn pipeline(indexed: bool) -> RagPipeline {
        pipeline_with(Arc::new(Reply), indexed).await
    }

    async fn pipeline_with(generator: Arc<dyn TextGenerator>, indexed: bool) -> RagPipeline {
        let pipeline = RagPipeline::builder()
            .config(RagConfig::builder().vector_size(2).build().unwrap())
            .embedding_provider(Arc::new(Unit))
            .text_generator(generator)
            .vector_store(Arc::new(InMemoryVectorStore::new()))
            .build()
            .unwrap();
        pipeline.initialize().await.unwrap();
        if indexed {
            pipeline.index(Arc::new(OneFile)).await.unwrap();
        }
        pipeline
    }

    async fn transcript(pipeline: &RagPipeline, reader: &mut Scripted) -> String {
        let mut out = Vec::new();
        question_loop(pipeline, reader, &mut out, std::future::pending::<()>).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn interrupt_while_answering_exits_cleanly() {
        let pipeline = pipeline_with(Arc::new(Stalled), true).await;
        let mut reader = Scripted::lines(&["what is this?", "never asked"]);
        let mut out = Vec::new();

        question_loop(&pipeline, &mut reader, &mut out, || async {}).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.ends_with("Searching for information...\n\nGoodbye!\n"));
        assert!(!out.contains("Answer:"));
        assert_eq!(reader.0.len(), 1);
    }

    #[tokio::test]
    async fn answers_then_quits() {
        let pipeline = pipeline(true).await;
        let out = transcript(&pipeline, &mut Scripted::lines(&["", "what is this?", "QUIT"])).await;

        assert!(out.contains("Answer:\nQuarterly planning notes."));
        assert!(out.contains("1. notes.txt (score: 1.000)"));
        assert!(out.ends_with("Goodbye!\n"));
        assert_eq!(out.matches("Searching for information...").count(), 1);
    }

    #[tokio::test]
    async fn interrupt_ends_the_loop() {
        let pipeline = pipeline(true).await;
        let mut reader = Scripted(VecDeque::from([Input::Exit, Input::Line("never".into())]));
        let out = transcript(&pipeline, &mut reader).await;

        assert_eq!(out, "\nGoodbye!\n");
        assert_eq!(reader.0.len(), 1);
    }

    #[tokio::test]
    async fn empty_index_reports_no_results_and_continues() {
        let pipeline = pipeline(false).await;
        let out = transcript(&pipeline, &mut Scripted::lines(&["anything?", "exit"])).await;

        assert!(out.contains("No relevant information found.\n"));
        assert!(out.ends_with("Goodbye!\n"));
    }

    #[test]
    fn sources_are_numbered_with_three_decimals() {
        let answer = Answer {
            text: "x".into(),
            sources: vec![
                SearchResult { id: 1, name: "a".into(), content: String::new(), score: 0.91234 },
                SearchResult { id: 2, name: "b".into(), content: String::new(), score: 0.5 },
            ],
        };
        let text = render_answer(Some(&answer));
        assert!(text.contains("1. a (score: 0.912)\n2. b (score: 0.500)\n"));
    }
}
