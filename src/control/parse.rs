//! Tokenizing the wire protocol (§4.1, §6): whitespace-separated fields,
//! terminated by any of `\r\n\t `. `str::split_whitespace` already treats all
//! four as delimiters, so no custom tokenizer is needed.

/// One raw, tokenized command line. `cookie` is present only in UDP/UDP6
/// mode, where the controller prefixes every request with an opaque token
/// it expects echoed back on the reply.
#[derive(Debug, Clone)]
pub struct Request<'a> {
    pub cookie: Option<&'a str>,
    pub argv: Vec<&'a str>,
}

impl<'a> Request<'a> {
    /// The verb character: the first, uppercased character of `argv[0]`.
    pub fn verb(&self) -> Option<char> {
        self.argv.first()?.chars().next().map(|c| c.to_ascii_uppercase())
    }

    /// Modifier characters: everything after the verb character in
    /// `argv[0]`, uppercased (e.g. `uAZ400` -> `['A', 'Z', '4', '0', '0']`).
    pub fn modifiers(&self) -> impl Iterator<Item = char> + '_ {
        self.argv
            .first()
            .into_iter()
            .flat_map(|s| s.chars().skip(1))
            .map(|c| c.to_ascii_uppercase())
    }

    pub fn arg(&self, i: usize) -> Option<&'a str> {
        self.argv.get(i).copied()
    }
}

pub fn parse_request(raw: &str, udp_mode: bool) -> Option<Request<'_>> {
    let mut tokens = raw.split_whitespace();
    let first = tokens.next()?;

    let (cookie, cmd_token) = if udp_mode {
        let second = tokens.next()?;
        (Some(first), second)
    } else {
        (None, first)
    };

    let mut argv = vec![cmd_token];
    argv.extend(tokens);
    if argv.is_empty() {
        return None;
    }
    Some(Request { cookie, argv })
}
