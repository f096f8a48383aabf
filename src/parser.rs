use crate::command::{CommandDescriptor, OutputRedirect, Pipeline, RedirectMode};
use crate::error::ParseError;
use crate::lexer::{Token, TokenKind};
use std::path::PathBuf;

struct PipelineBuilder {
    tokens: std::vec::IntoIter<Token>,
    stages: Vec<CommandDescriptor>,
    current: CommandDescriptor,
}

impl PipelineBuilder {
    fn from(tokens: Vec<Token>) -> Self {
        PipelineBuilder {
            tokens: tokens.into_iter(),
            stages: Vec::new(),
            current: CommandDescriptor::default(),
        }
    }

    fn build(mut self) -> Result<Pipeline, ParseError> {
        while let Some(token) = self.tokens.next() {
            match token.kind {
                TokenKind::Word => self.current.arguments.push(token.text),
                TokenKind::Pipe => {
                    let finished = std::mem::take(&mut self.current);
                    self.stages.push(finished);
                }
                TokenKind::RedirectIn => {
                    let path = self.redirect_target(&token)?;
                    self.current.input_redirect = Some(path);
                }
                TokenKind::RedirectOut | TokenKind::RedirectAppend => {
                    let mode = if token.kind == TokenKind::RedirectAppend {
                        RedirectMode::Append
                    } else {
                        RedirectMode::Truncate
                    };
                    let path = self.redirect_target(&token)?;
                    self.current.output_redirect = Some(OutputRedirect { path, mode });
                }
            }
        }
        self.stages.push(self.current);
        Ok(Pipeline::new(self.stages))
    }

    /// Consume the token following a redirection operator as its path.
    ///
    /// The following token is taken whatever its kind; only its absence is an
    /// error.
    fn redirect_target(&mut self, operator: &Token) -> Result<PathBuf, ParseError> {
        match self.tokens.next() {
            Some(target) => Ok(PathBuf::from(target.text)),
            None => Err(ParseError::MalformedRedirect {
                operator: operator.text.clone(),
            }),
        }
    }
}

/// Group `tokens` into a pipeline of command descriptors.
///
/// The result always holds at least one stage; an empty token list gives a
/// single stage without arguments.
pub fn parse(tokens: Vec<Token>) -> Result<Pipeline, ParseError> {
    let pipeline = PipelineBuilder::from(tokens).build()?;
    tracing::debug!(stages = pipeline.len(), "parsed pipeline");
    Ok(pipeline)
}
