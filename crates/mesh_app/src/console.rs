//! Line-oriented console: parses stdin input and formats relayed messages.

use mesh_network::{MessageBatch, PeerEntry, RelayStatsSnapshot, RelayedMessage};

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send the text to every known peer.
    Send(String),
    /// List known peers.
    Peers,
    /// Print relay counters.
    Stats,
    /// Drain queued messages and print them as a JSON batch.
    Drain,
    Help,
    Quit,
    /// Blank input.
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Self::Empty;
        }

        let Some(rest) = line.strip_prefix('/') else {
            return Self::Send(line.to_string());
        };
        // "//text" sends "/text" literally.
        if rest.starts_with('/') {
            return Self::Send(rest.to_string());
        }

        match rest.trim() {
            "peers" => Self::Peers,
            "stats" => Self::Stats,
            "drain" => Self::Drain,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        }
    }
}

pub const HELP: &str = "Type a message to send it to all peers.
  /peers   list known peers
  /stats   show relay counters
  /drain   print queued messages as JSON
  /quit    exit
  //text   send a message starting with '/'";

pub fn format_message(msg: &RelayedMessage) -> String {
    format!("[{:>10}] {}: {}", msg.timestamp, msg.sender, msg.text)
}

pub fn format_peers(peers: &[PeerEntry]) -> String {
    if peers.is_empty() {
        return "No peers discovered yet".to_string();
    }
    let mut out = format!("{} peer(s):", peers.len());
    for (i, peer) in peers.iter().enumerate() {
        out.push_str(&format!("\n  {:>2}. {}", i + 1, peer.address));
    }
    out
}

pub fn format_stats(stats: &RelayStatsSnapshot) -> String {
    format!(
        "frames={} beacons={} chats={} malformed={} self={} queue_drops={} \
         transport_drops={} capacity_rejections={} send_failures={}",
        stats.frames_received,
        stats.beacons,
        stats.chats,
        stats.malformed,
        stats.from_self,
        stats.queue_drops,
        stats.transport_drops,
        stats.capacity_rejections,
        stats.send_failures,
    )
}

pub fn format_batch_json(batch: &MessageBatch) -> Result<String, serde_json::Error> {
    serde_json::to_string(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_network::PeerAddress;

    #[test]
    fn test_parse_plain_text_is_send() {
        assert_eq!(
            Command::parse("hello mesh\n"),
            Command::Send("hello mesh".to_string())
        );
        assert_eq!(
            Command::parse("  padded  "),
            Command::Send("  padded  ".to_string())
        );
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/peers"), Command::Peers);
        assert_eq!(Command::parse("/stats\r\n"), Command::Stats);
        assert_eq!(Command::parse("/drain"), Command::Drain);
        assert_eq!(Command::parse("/?"), Command::Help);
        assert_eq!(Command::parse("/exit"), Command::Quit);
        assert_eq!(Command::parse("/nope"), Command::Unknown("nope".to_string()));
    }

    #[test]
    fn test_parse_blank_and_escaped() {
        assert_eq!(Command::parse(""), Command::Empty);
        assert_eq!(Command::parse("   \n"), Command::Empty);
        assert_eq!(
            Command::parse("//peers"),
            Command::Send("/peers".to_string())
        );
    }

    #[test]
    fn test_format_message() {
        let msg = RelayedMessage {
            sender: PeerAddress::new([0x24, 0x6f, 0x28, 0xaa, 0xbb, 0xcc]),
            text: "hi".to_string(),
            timestamp: 42,
        };
        assert_eq!(format_message(&msg), "[        42] 24:6f:28:aa:bb:cc: hi");
    }

    #[test]
    fn test_format_peers() {
        assert_eq!(format_peers(&[]), "No peers discovered yet");
        let peers = vec![PeerEntry {
            address: PeerAddress::new([2, 0, 0, 0, 0, 1]),
            active: true,
        }];
        assert_eq!(format_peers(&peers), "1 peer(s):\n   1. 02:00:00:00:00:01");
    }

    #[test]
    fn test_format_stats_reports_both_drop_points() {
        let stats = RelayStatsSnapshot {
            queue_drops: 2,
            transport_drops: 5,
            ..Default::default()
        };
        let line = format_stats(&stats);
        assert!(line.contains("queue_drops=2"));
        assert!(line.contains("transport_drops=5"));
    }

    #[test]
    fn test_format_batch_json() {
        let batch = MessageBatch::default();
        assert_eq!(format_batch_json(&batch).unwrap(), r#"{"messages":[]}"#);
    }
}
