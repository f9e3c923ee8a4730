//! Command line parser

/// Zero-copy command line parser for DOS style switches.
///
/// Understands `/flag`, `/key:value` and `key=value`. The leading slash is optional
/// and stripped from the key.
pub struct CmdLine<'a> {
    raw: &'a str,
}

impl<'a> CmdLine<'a> {
    /// Create an iterator for parsing a command line string.
    pub fn parse(raw: &str) -> CmdLine {
        CmdLine { raw }
    }

    /// Whether there is anything but whitespace left.
    pub fn is_empty(&self) -> bool {
        self.raw.trim().is_empty()
    }

    /// Skip consecutive whitespace from the front.
    fn skip_whitespace(&mut self) {
        self.raw = self.raw.trim_start();
    }

    /// Skip the switch character in front of a key.
    fn skip_switch_prefix(&mut self) {
        if let Some(rest) = self.raw.strip_prefix('/') {
            self.raw = rest;
        }
    }

    /// Consume the next symbol in the command line. A symbol is either
    /// - a consecutive sequence of characters that are neither whitespace nor a separator
    ///   (depending on the `accept_separator` flag)
    /// - a quoted string of arbitrary characters except quotes
    fn parse_symbol(&mut self, accept_separator: bool) -> Option<&'a str> {
        let first_ch = self.raw.chars().next()?;

        if first_ch == '"' {
            let rest = &self.raw[1..];
            match rest.find('"') {
                None => {
                    self.raw = "";
                    Some(rest)
                }
                Some(pos) => {
                    self.raw = &rest[pos + 1..];
                    Some(&rest[0..pos])
                }
            }
        } else {
            let s = self.raw;
            match s.find(|c: char| (!accept_separator && is_separator(c)) || c.is_whitespace()) {
                None => {
                    self.raw = "";
                    Some(s)
                }
                Some(pos) => {
                    let (value, rest) = s.split_at(pos);
                    self.raw = rest;
                    Some(value)
                }
            }
        }
    }

    /// Parse a key/value separator. Returns true if one was found, otherwise false.
    fn parse_separator(&mut self) -> bool {
        match self.raw.chars().next() {
            Some(c) if is_separator(c) => {
                self.raw = &self.raw[1..];
                true
            }
            _ => false,
        }
    }
}

fn is_separator(c: char) -> bool {
    c == ':' || c == '='
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub enum CmdLineToken<'a> {
    Flag(&'a str),
    KeyValuePair(&'a str, &'a str),
}

impl<'a> CmdLineToken<'a> {
    pub fn key(&self) -> &'a str {
        match *self {
            CmdLineToken::Flag(key) => key,
            CmdLineToken::KeyValuePair(key, _) => key,
        }
    }
}

impl<'a> Iterator for CmdLine<'a> {
    type Item = CmdLineToken<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        self.skip_switch_prefix();
        let key = self.parse_symbol(false)?;
        if self.parse_separator() {
            let value = self.parse_symbol(true).unwrap_or("");
            Some(CmdLineToken::KeyValuePair(key, value))
        } else {
            Some(CmdLineToken::Flag(key))
        }
    }
}
