//! Wire messages sent to the client.
//!
//! Every message is UTF-8 text made of CR+LF terminated lines:
//! - banner: sent once, right after accept
//! - push: the periodic status line
//! - response: a single reply line to a client command

use bytes::BytesMut;
use chrono::NaiveDateTime;
use std::net::SocketAddr;

/// Line terminator used for every line on the wire.
pub const CRLF: &str = "\r\n";

/// Separator line framing the banner.
pub const SEPARATOR: &str = "=====================================";

/// Usage hint printed in the banner.
pub const USAGE_HINT: &str = "press Ctrl+] and enter quit to exit";

/// Commands listed in the banner and in unknown-command replies.
pub const SUPPORTED_COMMANDS: &str = "hello, time, exit";

/// Marker text carried by every push line.
pub const PUSH_MARKER: &str = "now is running";

/// Format used for second-precision timestamps.
pub const SECONDS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format used for millisecond-precision timestamps.
pub const MILLIS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Build the welcome banner.
pub fn banner(title: &str, now: NaiveDateTime) -> BytesMut {
    let text = format!(
        "{SEPARATOR}{CRLF}\
         {title}{CRLF}\
         {}{CRLF}\
         {USAGE_HINT}{CRLF}\
         supported commands: {SUPPORTED_COMMANDS}{CRLF}\
         {SEPARATOR}{CRLF}",
        now.format(SECONDS_FORMAT),
    );
    BytesMut::from(text.as_bytes())
}

/// Build one periodic push line.
///
/// The counter is zero-padded to four digits; larger values widen.
pub fn push(now: NaiveDateTime, counter: u64, peer: SocketAddr) -> BytesMut {
    let text = format!(
        "[{}] counter: {counter:04} | {PUSH_MARKER} | client: {}:{}{CRLF}",
        now.format(MILLIS_FORMAT),
        peer.ip(),
        peer.port(),
    );
    BytesMut::from(text.as_bytes())
}

/// Terminate a response text with CR+LF.
pub fn response(text: &str) -> BytesMut {
    let mut buf = BytesMut::with_capacity(text.len() + CRLF.len());
    buf.extend_from_slice(text.as_bytes());
    buf.extend_from_slice(CRLF.as_bytes());
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32, ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_milli_opt(h, m, s, ms)
            .unwrap()
    }

    #[test]
    fn test_banner_layout() {
        let banner = banner("SuperSSH Telnet TestServer", at(8, 30, 0, 999));
        assert_eq!(
            &banner[..],
            b"=====================================\r\n\
              SuperSSH Telnet TestServer\r\n\
              2024-03-09 08:30:00\r\n\
              press Ctrl+] and enter quit to exit\r\n\
              supported commands: hello, time, exit\r\n\
              =====================================\r\n"
        );
    }

    #[test]
    fn test_push_line() {
        let peer: SocketAddr = "192.168.1.20:50123".parse().unwrap();
        let line = push(at(8, 30, 1, 7), 3, peer);
        assert_eq!(
            &line[..],
            b"[2024-03-09 08:30:01.007] counter: 0003 | now is running | client: 192.168.1.20:50123\r\n"
        );
    }

    #[test]
    fn test_push_counter_widens() {
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let line = push(at(0, 0, 0, 0), 12345, peer);
        assert!(std::str::from_utf8(&line)
            .unwrap()
            .contains("counter: 12345 |"));
    }

    #[test]
    fn test_push_ipv6_peer() {
        let peer: SocketAddr = "[::1]:2323".parse().unwrap();
        let line = push(at(0, 0, 0, 0), 1, peer);
        assert!(line.ends_with(b"client: ::1:2323\r\n"));
    }

    #[test]
    fn test_response_is_crlf_terminated() {
        assert_eq!(&response("héllo")[..], "héllo\r\n".as_bytes());
    }
}
