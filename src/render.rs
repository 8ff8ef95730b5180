use crate::error::LockGraphError::{Render, UnsupportedFormat};
use crate::lock_graph::{LockGraph, Vertex};
use anyhow::{anyhow, Context, Result};
use std::fmt::{self, Write};
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Output formats understood by the Graphviz `dot` executable.
pub const FORMATS: &[&str] = &[
    "bmp", "canon", "cmap", "cmapx", "dot", "eps", "fig", "gd", "gif", "gv", "imap", "ismap",
    "jpe", "jpeg", "jpg", "json", "json0", "pdf", "pic", "plain", "plain-ext", "png", "pov", "ps",
    "ps2", "svg", "svgz", "tif", "tiff", "tk", "vml", "vmlz", "vrml", "wbmp", "webp", "xdot",
];

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct OutputFormat(String);

impl OutputFormat {
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Formats written as plain DOT source without running Graphviz.
    pub fn is_source(&self) -> bool {
        self.0 == "gv" || self.0 == "dot"
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat("png".to_string())
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> Result<Self> {
        if FORMATS.iter().any(|format| *format == name) {
            Ok(OutputFormat(name.to_string()))
        } else {
            Err(anyhow!(UnsupportedFormat(name.to_string())))
        }
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            c => escaped.push(c),
        }
    }
    escaped
}

pub fn graph_name(graph: &LockGraph) -> String {
    format!("{}_lock_graph", graph.database())
}

/// Path Graphviz itself would use for the rendered file.
pub fn default_output_path(graph: &LockGraph, format: &OutputFormat) -> PathBuf {
    PathBuf::from(format!("{}.gv.{}", graph_name(graph), format.name()))
}

fn write_dot(graph: &LockGraph, dot: &mut impl Write) -> fmt::Result {
    writeln!(dot, "digraph \"{}\" {{", escape(&graph_name(graph)))?;
    for vertex in graph.vertices() {
        match vertex {
            Vertex::Process(process) => writeln!(
                dot,
                "\t\"{}\" [label=\"PID {}\\n{}\" peripheries=2 shape=box]",
                process.key(),
                process.pid,
                escape(&process.query)
            )?,
            Vertex::Relation(relation) => writeln!(
                dot,
                "\t\"{}\" [label=\"{}\" shape=box]",
                relation.key(),
                escape(&relation.name)
            )?,
        }
    }
    for edge in graph.edges() {
        writeln!(
            dot,
            "\t\"{}\" -> \"{}\" [label=\"{}\" style={}]",
            edge.source_key(),
            edge.target_key(),
            escape(edge.mode()),
            if edge.granted() { "solid" } else { "dashed" }
        )?;
    }
    writeln!(dot, "}}")
}

/// DOT source for the graph. Processes are double-bordered boxes,
/// relations single-bordered; held locks are solid, waits dashed.
pub fn to_dot(graph: &LockGraph) -> String {
    let mut dot = String::new();
    write_dot(graph, &mut dot).expect("writing to a String does not fail");
    dot
}

/// Renders lock graphs through the Graphviz `dot` executable.
#[derive(Debug, Clone)]
pub struct Graphviz {
    program: String,
}

impl Default for Graphviz {
    fn default() -> Self {
        Self::with_program("dot")
    }
}

impl Graphviz {
    pub fn with_program(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    pub async fn render(&self, graph: &LockGraph, format: &OutputFormat) -> Result<Vec<u8>> {
        let source = to_dot(graph);
        if format.is_source() {
            return Ok(source.into_bytes());
        }

        debug!(program = %self.program, format = format.name(), "Running Graphviz");
        let mut child = Command::new(&self.program)
            .arg(format!("-T{}", format.name()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start '{}'", self.program))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!(Render("no stdin for renderer".to_string())))?;
        let writer = tokio::spawn(async move {
            let written = stdin.write_all(source.as_bytes()).await;
            drop(stdin);
            written
        });

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(anyhow!(Render(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))));
        }
        writer.await??;
        Ok(output.stdout)
    }
}
