//! Outgoing command framing
//!
//! The server reads commands in bounded chunks, so long command lines are
//! written in pieces. Only the last piece carries the line terminator.

/// Line terminator for commands
pub const LINE_TERMINATOR: &str = "\n";

/// Maximum number of characters written per chunk
pub const COMMAND_SPLIT: usize = 1024;

/// Split a command into chunks of at most `max_chunk` characters
///
/// An empty command still yields one chunk holding the terminator.
pub fn split_command(text: &str, max_chunk: usize) -> Vec<String> {
    let max_chunk = max_chunk.max(1);
    let mut chunks: Vec<String> = Vec::with_capacity(text.len() / max_chunk + 1);
    let mut current = String::new();
    let mut count = 0;

    for c in text.chars() {
        if count == max_chunk {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(c);
        count += 1;
    }
    current.push_str(LINE_TERMINATOR);
    chunks.push(current);

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_short_command() {
        let chunks = split_command("version", COMMAND_SPLIT);
        assert_eq!(chunks, vec!["version\n"]);
    }

    #[test]
    fn test_split_long_command() {
        let text = "x".repeat(2000);
        let chunks = split_command(&text, 1024);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 1024);
        assert!(!chunks[0].ends_with(LINE_TERMINATOR));
        assert_eq!(chunks[1].len(), 2000 - 1024 + 1);
        assert!(chunks[1].ends_with(LINE_TERMINATOR));
        assert_eq!(chunks.concat(), format!("{}\n", text));
    }

    #[test]
    fn test_split_exact_multiple() {
        let text = "y".repeat(2048);
        let chunks = split_command(&text, 1024);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], format!("{}\n", "y".repeat(1024)));
    }

    #[test]
    fn test_split_empty_command() {
        assert_eq!(split_command("", COMMAND_SPLIT), vec!["\n"]);
    }

    #[test]
    fn test_split_counts_characters_not_bytes() {
        let text = "ä".repeat(5);
        let chunks = split_command(&text, 2);
        assert_eq!(chunks, vec!["ää", "ää", "ä\n"]);
    }
}
