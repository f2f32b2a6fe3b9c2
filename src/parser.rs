use crate::lexer::{self, Token};
use std::iter::Peekable;
use thiserror::Error;
use tracing::warn;

/// Kind of redirection
///
/// Defines the specific operation mode for an I/O redirection (`<`, `>`, `>>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Input redirection (`<`): Reads standard input from a specified file.
    Input,
    /// Output redirection (`>`): Writes standard output to a file, **overwriting** the file if it exists.
    Output,
    /// Output redirection with append (`>>`): Writes standard output to a file, **appending** to the file if it exists.
    Append,
}

impl RedirectKind {
    pub fn is_output(self) -> bool {
        !matches!(self, RedirectKind::Input)
    }
}

/// A declared redirection: the path is kept as text and only opened when the
/// stage is spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub kind: RedirectKind,
    /// Empty when the operator was the last token on the line.
    pub target: String,
}

/// One command within a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stage {
    /// `None` when the segment had operators only.
    pub name: Option<String>,
    /// Argument vector, `argv[0]` is the name.
    pub argv: Vec<String>,
    pub background: bool,
    /// At most one redirect per kind, in the order they were last given.
    redirects: Vec<Redirect>,
}

impl Stage {
    fn push_word(&mut self, word: String) {
        if self.name.is_none() {
            self.name = Some(word.clone());
        }
        self.argv.push(word);
    }

    /// Record a redirect, replacing an earlier one of the same kind.
    pub fn set_redirect(&mut self, kind: RedirectKind, target: impl Into<String>) {
        self.redirects.retain(|r| r.kind != kind);
        self.redirects.push(Redirect {
            kind,
            target: target.into(),
        });
    }

    pub fn redirect(&self, kind: RedirectKind) -> Option<&Redirect> {
        self.redirects.iter().find(|r| r.kind == kind)
    }

    pub fn redirects(&self) -> &[Redirect] {
        &self.redirects
    }

    /// The output redirect that takes effect: with both `>` and `>>` present the
    /// one given last wins.
    pub fn output(&self) -> Option<&Redirect> {
        self.redirects.iter().rev().find(|r| r.kind.is_output())
    }

    /// Redirects that apply to this stage given its position in the chain.
    ///
    /// Intermediate stdin/stdout are pipe ends, so only the first stage keeps its
    /// input redirect and only the last keeps its output redirect.
    pub fn effective_redirects(&self, is_first: bool, is_last: bool) -> Vec<&Redirect> {
        let mut effective = Vec::with_capacity(2);
        if let Some(input) = self.redirect(RedirectKind::Input) {
            if is_first {
                effective.push(input);
            } else {
                warn!(path = %input.target, "input redirect ignored on a piped stage");
            }
        }
        if let Some(output) = self.output() {
            if is_last {
                effective.push(output);
            } else {
                warn!(path = %output.target, "output redirect ignored on a piped stage");
            }
        }
        effective
    }
}

/// An owned, finite chain of stages connected by pipes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
    /// Source text, used when reporting background jobs.
    pub line: String,
}

impl Pipeline {
    /// Only the last stage's flag is meaningful.
    pub fn is_background(&self) -> bool {
        self.stages.last().is_some_and(|s| s.background)
    }
}

/// Errors that can occur while turning a line into a pipeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParsingError {
    /// The line holds no tokens at all.
    #[error("empty line")]
    Empty,
    /// A token cannot become part of an argument vector.
    #[error("{0:?}: argument contains a NUL byte")]
    Nul(String),
}

struct StageBuilder {
    tokens: Peekable<std::vec::IntoIter<Token>>,
}

impl StageBuilder {
    /// Parse a stage: (word | redirect)* and link the rest of the line as its
    /// successors when a `|` is met.
    fn parse_chain(&mut self, stages: &mut Vec<Stage>) {
        let mut stage = Stage::default();
        while let Some(token) = self.tokens.next() {
            match token {
                Token::Word(word) => stage.push_word(word),
                Token::RedirectLeft => self.parse_redirect(&mut stage, RedirectKind::Input),
                Token::RedirectRight => self.parse_redirect(&mut stage, RedirectKind::Output),
                Token::RedirectAppend => self.parse_redirect(&mut stage, RedirectKind::Append),
                Token::Background => {
                    // the rest of this stage is ignored, a later `|` still chains
                    stage.background = true;
                    if self.skip_to_pipe() {
                        stages.push(stage);
                        return self.parse_chain(stages);
                    }
                    break;
                }
                Token::PipeOp => {
                    stages.push(stage);
                    return self.parse_chain(stages);
                }
            }
        }
        stages.push(stage);
    }

    /// Drop tokens up to and including the next `|`. Returns whether one was found.
    fn skip_to_pipe(&mut self) -> bool {
        self.tokens.by_ref().any(|t| t == Token::PipeOp)
    }

    /// An operator at the end of the line records an empty target.
    fn parse_redirect(&mut self, stage: &mut Stage, kind: RedirectKind) {
        let target = match self.tokens.next_if(|t| matches!(t, Token::Word(_))) {
            Some(Token::Word(word)) => word,
            _ => {
                if let Some(next) = self.tokens.peek() {
                    warn!(?kind, ?next, "redirect followed by an operator");
                }
                String::new()
            }
        };
        stage.set_redirect(kind, target);
    }
}

/// Turn one input line into a pipeline.
///
/// Parsing is purely structural: no path resolution, lookup or expansion.
pub fn parse_line(line: &str) -> Result<Pipeline, ParsingError> {
    let tokens = lexer::split_into_tokens(line);
    if tokens.is_empty() {
        return Err(ParsingError::Empty);
    }
    if let Some(Token::Word(bad)) = tokens
        .iter()
        .find(|t| matches!(t, Token::Word(w) if w.contains('\0')))
    {
        return Err(ParsingError::Nul(bad.clone()));
    }

    let mut builder = StageBuilder {
        tokens: tokens.into_iter().peekable(),
    };
    let mut stages = Vec::new();
    builder.parse_chain(&mut stages);
    Ok(Pipeline {
        stages,
        line: line.trim().to_string(),
    })
}
