//! IRC line parsing and outbound command formatting.

/// A parsed inbound line: `[:prefix] COMMAND params... [:trailing]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parse one line with or without its trailing CRLF. Returns `None` for
    /// blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(|c: char| c == '\r' || c == '\n').trim_start();
        if rest.is_empty() {
            return None;
        }

        // IRCv3 tags are not used here.
        if rest.starts_with('@') {
            let (_, after) = rest.split_once(' ')?;
            rest = after.trim_start();
        }

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, after) = stripped.split_once(' ')?;
            rest = after.trim_start();
            Some(prefix.to_string())
        } else {
            None
        };

        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => (rest, None),
        };

        let mut words = head.split_whitespace();
        let command = words.next()?.to_ascii_uppercase();
        let mut params: Vec<String> = words.map(String::from).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Some(Self {
            prefix,
            command,
            params,
        })
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }
}

/// Replace line breaks so untrusted text stays on one protocol line.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c == '\r' || c == '\n' || c == '\0' { ' ' } else { c })
        .collect()
}

pub fn nick(nickname: &str) -> String {
    format!("NICK {}", sanitize(nickname))
}

pub fn user(ident: &str, real_name: &str) -> String {
    format!("USER {} 0 * :{}", sanitize(ident), sanitize(real_name))
}

pub fn pass(password: &str) -> String {
    format!("PASS {}", sanitize(password))
}

pub fn pong(token: &str) -> String {
    format!("PONG :{}", sanitize(token))
}

pub fn join(channel: &str) -> String {
    format!("JOIN {}", sanitize(channel))
}

pub fn mode(target: &str, modes: &str) -> String {
    format!("MODE {} {}", sanitize(target), sanitize(modes))
}

pub fn privmsg(target: &str, text: &str) -> String {
    format!("PRIVMSG {} :{}", sanitize(target), sanitize(text))
}

pub fn quit(reason: &str) -> String {
    format!("QUIT :{}", sanitize(reason))
}
