//! Lexical analysis for the command line.
//!
//! The grammar is deliberately small: tokens are separated by spaces, tabs and
//! newlines, and a handful of whole tokens act as operators. There is no quoting
//! and no escaping, so `echo "a | b"` is four words and a pipe.

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// An ordinary word: command name, argument or redirect target.
    Word(String),
    /// The pipe operator, `|`.
    PipeOp,
    /// Background marker, `&`.
    Background,
    /// Input redirection symbol, `<`.
    RedirectLeft,
    /// Truncating output redirection symbol, `>`.
    RedirectRight,
    /// Appending output redirection symbol, `>>`.
    RedirectAppend,
}

impl Token {
    fn classify(raw: &str) -> Self {
        match raw {
            "|" => Token::PipeOp,
            "&" => Token::Background,
            "<" => Token::RedirectLeft,
            ">" => Token::RedirectRight,
            ">>" => Token::RedirectAppend,
            word => Token::Word(word.to_string()),
        }
    }
}

fn is_separator(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\n')
}

/// The main entry point function to perform lexical analysis.
///
/// Operators are only recognized as standalone tokens: `a|b` is a single word,
/// just like `>out`.
pub fn split_into_tokens(line: &str) -> Vec<Token> {
    line.split(is_separator)
        .filter(|raw| !raw.is_empty())
        .map(Token::classify)
        .collect()
}
