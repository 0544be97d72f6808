//! Buffer for asynchronous notification lines

use std::collections::VecDeque;

use super::codec::{parse_once, Record};

/// FIFO of raw event lines, parsed when taken out
#[derive(Debug, Default)]
pub struct EventQueue {
    lines: VecDeque<String>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: String) {
        self.lines.push_back(line);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Remove and parse every queued event, oldest first
    pub fn drain(&mut self) -> Vec<Record> {
        self.lines.drain(..).map(|line| parse_once(&line)).collect()
    }

    /// Remove and parse the oldest queued event
    pub fn pop(&mut self) -> Option<Record> {
        self.lines.pop_front().map(|line| parse_once(&line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_in_arrival_order() {
        let mut queue = EventQueue::new();
        queue.push("notifyclientleftview clid=1".to_string());
        queue.push("notifycliententerview clid=2".to_string());

        let events = queue.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].first_name(), Some("notifyclientleftview"));
        assert_eq!(events[1].get_str("clid"), Some("2"));
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_pop_takes_oldest() {
        let mut queue = EventQueue::new();
        queue.push("notifytextmessage msg=a".to_string());
        queue.push("notifytextmessage msg=b".to_string());

        assert_eq!(queue.pop().unwrap().get_str("msg"), Some("a"));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().get_str("msg"), Some("b"));
        assert!(queue.pop().is_none());
    }
}
