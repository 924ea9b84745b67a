//! Scrape pipeline: fetch → analyze → generate → execute → save.
//!
//! The language model is reached through the [`Completion`] capability; every
//! call is wrapped by a [`BoundedTaskRunner`] so a hung round trip cannot stall
//! the pipeline.

use crate::connection::Connection;
use crate::error::{PipelineError, TaskError};
use crate::report::{default_sink, FailureSink};
use crate::task::BoundedTaskRunner;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Local;
use log::info;
use regex::Regex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::process::Command;

/// A hosted language model that answers a prompt with text.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn send(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Prompt asking the model to locate the target data in a page.
pub fn html_analysis_prompt(url: &str, target_description: &str, html: &str) -> String {
    format!(
        "You are a specialized HTML analyzer. Your task is to extract and identify relevant tags and \
         elements from the provided HTML content.\n\n\
         URL: {url}\n\
         Target Description: {target_description}\n\n\
         HTML Content:\n{html}\n\n\
         Provide a structured JSON output containing:\n\
         1. Relevant HTML tags and their attributes\n\
         2. CSS selectors for target elements\n\
         3. Data structure patterns found\n\n\
         Format your response as valid JSON only."
    )
}

/// Prompt asking the model for an extraction script.
pub fn code_generation_prompt(analysis_results: &str) -> String {
    format!(
        "You are a Python code generator. Based on the following HTML analysis results, generate \
         clean, production-ready Python code.\n\n\
         Analysis Results:\n{analysis_results}\n\n\
         Requirements:\n\
         - Use BeautifulSoup4 for parsing\n\
         - Include proper error handling\n\
         - Include logging\n\
         - Return structured data\n\n\
         Generate only valid Python code without any explanatory text or markdown formatting."
    )
}

struct Patterns {
    python_block: Regex,
    any_block: Regex,
    header: Regex,
    bold: Regex,
    italic: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        python_block: Regex::new(r"(?s)```python\s*(.*?)\s*```").expect("valid regex"),
        any_block: Regex::new(r"(?s)```\s*(.*?)\s*```").expect("valid regex"),
        header: Regex::new(r"#\s+").expect("valid regex"),
        bold: Regex::new(r"\*\*(.*?)\*\*").expect("valid regex"),
        italic: Regex::new(r"\*(.*?)\*").expect("valid regex"),
    })
}

/// Pull code out of a model reply.
///
/// Prefers the first ```` ```python ```` block, then the first bare fenced
/// block. Without any fence the reply is returned with markdown emphasis removed.
pub fn extract_code_block(reply: &str) -> String {
    let p = patterns();
    if let Some(caps) = p.python_block.captures(reply) {
        return caps[1].trim().to_string();
    }
    if let Some(caps) = p.any_block.captures(reply) {
        return caps[1].trim().to_string();
    }
    let cleaned = p.header.replace_all(reply, "# ");
    let cleaned = p.bold.replace_all(&cleaned, "$1");
    let cleaned = p.italic.replace_all(&cleaned, "$1");
    cleaned.trim().to_string()
}

/// Knobs for the pipeline steps after URL validation.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Characters of each page sent for analysis.
    pub html_limit: usize,
    /// Where the generated script is written.
    pub script_path: PathBuf,
    /// Program used to run the script.
    pub interpreter: String,
    /// Wall-clock limit for the script.
    pub script_timeout: Duration,
    /// Raw stdout of the script is copied here.
    pub data_path: PathBuf,
    /// Directory receiving the final document.
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            html_limit: 5000,
            script_path: PathBuf::from("scraper.py"),
            interpreter: "python".to_string(),
            script_timeout: Duration::from_secs(300),
            data_path: PathBuf::from("scraped_data.txt"),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Sequences the scrape steps over validated URLs.
pub struct Pipeline {
    connection: Arc<Connection>,
    client: Arc<dyn Completion>,
    runner: BoundedTaskRunner,
    config: PipelineConfig,
    sink: Arc<dyn FailureSink>,
}

impl Pipeline {
    pub fn new(
        connection: Arc<Connection>,
        client: Arc<dyn Completion>,
        runner: BoundedTaskRunner,
        config: PipelineConfig,
    ) -> Self {
        Self {
            connection,
            client,
            runner,
            config,
            sink: default_sink(),
        }
    }

    /// Report failures to `sink` instead of the log.
    pub fn with_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The runner wrapping model calls, e.g. to cancel the one in flight.
    pub fn runner(&self) -> &BoundedTaskRunner {
        &self.runner
    }

    /// Fetch every URL, direct first and through the fallback proxy second.
    /// Pages that fail both tiers are left out.
    pub async fn fetch_pages(&self, urls: &[String]) -> Vec<(String, String)> {
        let mut pages = Vec::with_capacity(urls.len());
        for url in urls {
            let body = match self.connection.fetch_with_fallback(url).await {
                Ok(resp) => resp.text().await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match body {
                Ok(html) => pages.push((url.clone(), html)),
                Err(e) => self.sink.report(&format!(
                    "Failed to fetch HTML from {} with both direct and proxy connections: {}",
                    url, e
                )),
            }
        }
        pages
    }

    /// Ask the model to analyze each page. A failed analysis is kept as `None`.
    pub async fn analyze(&self, pages: &[(String, String)], target_description: &str) -> Vec<(String, Option<String>)> {
        let mut results = Vec::with_capacity(pages.len());
        for (url, html) in pages {
            let html: String = html.chars().take(self.config.html_limit).collect();
            let prompt = html_analysis_prompt(url, target_description, &html);
            let analysis = match self.ask(prompt).await {
                Ok(reply) => Some(extract_code_block(&reply)).filter(|a| !a.is_empty()),
                Err(e) => {
                    self.sink.report(&format!("HTML analysis failed for {}: {}", url, e));
                    None
                }
            };
            results.push((url.clone(), analysis));
        }
        results
    }

    /// Ask the model for an extraction script built from the analyses.
    pub async fn generate_code(&self, analyses: &[(String, Option<String>)]) -> Result<String, PipelineError> {
        let rendered = analyses
            .iter()
            .filter_map(|(url, analysis)| analysis.as_ref().map(|a| format!("URL: {}\n{}", url, a)))
            .collect::<Vec<_>>()
            .join("\n\n");
        if rendered.is_empty() {
            return Err(PipelineError::NoAnalysis);
        }

        let reply = self.ask(code_generation_prompt(&rendered)).await?;
        let code = extract_code_block(&reply);
        if code.is_empty() {
            return Err(PipelineError::Generation(TaskError::Failed("empty code".to_string())));
        }
        Ok(code)
    }

    /// Save `code` to the script path, run it and return its stdout.
    ///
    /// Output on stderr or a non-zero exit counts as failure. Stdout is also
    /// copied to the data path.
    pub async fn execute(&self, code: &str) -> Result<String, PipelineError> {
        tokio::fs::write(&self.config.script_path, code).await?;

        let child = Command::new(&self.config.interpreter)
            .arg(&self.config.script_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(self.config.script_timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => return Err(PipelineError::ScriptTimeout(self.config.script_timeout)),
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            return Err(PipelineError::Script(stderr.trim().to_string()));
        }
        if !output.status.success() {
            return Err(PipelineError::Script(format!("exited with {}", output.status)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        tokio::fs::write(&self.config.data_path, &stdout).await?;
        Ok(stdout)
    }

    /// Write `content` to a timestamped text document and return its path.
    pub async fn save_document(&self, content: &str) -> Result<PathBuf, PipelineError> {
        if content.trim().is_empty() {
            return Err(PipelineError::EmptyOutput);
        }
        let now = Local::now();
        let path = self
            .config
            .output_dir
            .join(format!("scrape_result_{}.txt", now.format("%Y%m%d_%H%M%S")));
        let document = format!(
            "Scraping Result\n\nGenerated on: {}\n\n{}\n",
            now.format("%Y-%m-%d %H:%M:%S"),
            content
        );
        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        tokio::fs::write(&path, document).await?;
        Ok(path)
    }

    /// Run every step for already-validated `urls` and return the document path.
    pub async fn run(&self, urls: &[String], target_description: &str) -> Result<PathBuf, PipelineError> {
        info!("Fetching HTML content...");
        let pages = self.fetch_pages(urls).await;
        if pages.is_empty() {
            return Err(self.fail(PipelineError::NoPages));
        }

        info!("Analyzing HTML for {} page(s)...", pages.len());
        let analyses = self.analyze(&pages, target_description).await;

        info!("Generating code...");
        let code = self.generate_code(&analyses).await.map_err(|e| self.fail(e))?;

        info!("Executing generated code...");
        let data = self.execute(&code).await.map_err(|e| self.fail(e))?;

        info!("Saving output document...");
        let path = self.save_document(&data).await.map_err(|e| self.fail(e))?;
        info!("Scraping process completed: {}", path.display());
        Ok(path)
    }

    fn fail(&self, err: PipelineError) -> PipelineError {
        self.sink.report(&format!("Scraping process failed: {}", err));
        err
    }

    async fn ask(&self, prompt: String) -> Result<String, TaskError> {
        let client = Arc::clone(&self.client);
        self.runner
            .run(move |token| async move {
                tokio::select! {
                    _ = token.cancelled() => Err(anyhow!("request was interrupted")),
                    reply = client.send(&prompt) => reply,
                }
            })
            .await
    }
}
