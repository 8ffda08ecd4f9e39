//! Sessions: one variable store plus a handle on the plugin registry
//!
//! A session substitutes `${name}` references before dispatching, and when
//! the schema enables piping it records every command's output in the
//! reserved `_result` variable so the next pipeline stage can refer to it.
//! Sessions are not shared; wrap one in a mutex to use it from several
//! threads.

use std::sync::Arc;

use tracing::{debug, info};

use crate::dispatch::Dispatcher;
use crate::error::{DslError, DslResult, PipelineError};
use crate::plugin::{PluginRegistry, ResolverOutput};
use crate::schema::{validate, PipingConfig, SchemaDocument, RESERVED_RESULT};
use crate::variables::VariableStore;

#[derive(Debug)]
pub struct Session {
    dispatcher: Dispatcher,
    variables: VariableStore,
    piping: PipingConfig,
}

impl Session {
    /// Validate `schema` and start a session over `registry`
    pub fn new(registry: Arc<PluginRegistry>, schema: &SchemaDocument) -> DslResult<Self> {
        let errors = validate(schema);
        if !errors.is_empty() {
            return Err(DslError::Validation(errors));
        }
        let session = Self {
            dispatcher: Dispatcher::new(registry),
            variables: VariableStore::initialize(schema),
            piping: schema.piping(),
        };
        info!(
            variables = session.variables.len(),
            piping = session.piping.enabled,
            "session started"
        );
        Ok(session)
    }

    /// Session over an already initialized store. With piping enabled the
    /// store gains the `_result` slot if it lacks one.
    pub fn with_store(
        registry: Arc<PluginRegistry>,
        mut variables: VariableStore,
        piping: PipingConfig,
    ) -> Self {
        if piping.enabled {
            variables.declare_result();
        }
        Self {
            dispatcher: Dispatcher::new(registry),
            variables,
            piping,
        }
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.variables
    }

    pub fn piping(&self) -> &PipingConfig {
        &self.piping
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Substitute variables into `raw`, dispatch, and record the output
    pub fn execute(&mut self, plugin: &str, command: &str, raw: &str) -> DslResult<ResolverOutput> {
        let raw = self.variables.substitute(raw)?;
        let output = self.dispatcher.dispatch(plugin, command, &raw)?;
        if self.piping.enabled {
            self.variables
                .set(RESERVED_RESULT, output.clone().into_value())?;
        }
        Ok(output)
    }

    /// Run `<plugin> <command> [input]`, or a pipeline of them joined by
    /// the piping delimiter. Delimiters inside double-quoted spans belong to
    /// the stage input. Stops at the first failing stage and returns every
    /// stage's output otherwise.
    pub fn run_line(&mut self, line: &str) -> DslResult<Vec<ResolverOutput>> {
        let segments: Vec<&str> = if self.piping.enabled {
            split_pipeline(line, &self.piping.delimiter)
        } else {
            vec![line]
        };

        if segments.len() == 1 {
            let (plugin, command, raw) = split_segment(segments[0], 0)?;
            return Ok(vec![self.execute(plugin, command, raw)?]);
        }

        let mut outputs = Vec::with_capacity(segments.len());
        for (index, segment) in segments.into_iter().enumerate() {
            let (plugin, command, raw) = split_segment(segment, index)?;
            debug!(index, plugin, command, "running pipeline stage");
            let output = self
                .execute(plugin, command, raw)
                .map_err(|e| PipelineError::Segment {
                    index,
                    source: Box::new(e),
                })?;
            outputs.push(output);
        }
        Ok(outputs)
    }
}

/// Split on `delimiter` outside double quotes; `\"` does not close a quote
fn split_pipeline<'a>(line: &'a str, delimiter: &str) -> Vec<&'a str> {
    if delimiter.is_empty() {
        return vec![line];
    }
    let bytes = line.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut pos = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    while pos < bytes.len() {
        let byte = bytes[pos];
        if in_quotes {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_quotes = false;
            }
            pos += 1;
        } else if byte == b'"' {
            in_quotes = true;
            pos += 1;
        } else if bytes[pos..].starts_with(delimiter.as_bytes()) {
            segments.push(&line[start..pos]);
            pos += delimiter.len();
            start = pos;
        } else {
            pos += 1;
        }
    }
    segments.push(&line[start..]);
    segments
}

fn split_segment(segment: &str, index: usize) -> Result<(&str, &str, &str), PipelineError> {
    let segment = segment.trim();
    if segment.is_empty() {
        return Err(PipelineError::EmptySegment { index });
    }
    let (plugin, rest) = split_word(segment);
    let (command, raw) = split_word(rest);
    if command.is_empty() {
        return Err(PipelineError::MissingCommand {
            index,
            segment: segment.to_string(),
        });
    }
    Ok((plugin, command, raw))
}

fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(pos) => (&text[..pos], text[pos..].trim_start()),
        None => (text, ""),
    }
}
