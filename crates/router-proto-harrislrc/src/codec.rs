//! The Harris LRC line protocol: `~<TYPE><OP><ARG>[;<ARG>]*\`.
//!
//! Pure functions, no I/O. `decode` locates its own `~...\` window in
//! whatever buffer it is handed (independent of `router_core::transport`'s
//! own framing, which exists purely for backpressure/buffering at the
//! socket layer) so it stays trivially round-trip testable on its own.

use router_core::RouterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Change,
    ChangeNotify,
    Query,
    QueryResponse,
}

impl Op {
    fn as_char(self) -> char {
        match self {
            Op::Change => ':',
            Op::ChangeNotify => '!',
            Op::Query => '?',
            Op::QueryResponse => '%',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSig {
    Str,
    Num,
    Utf,
}

impl ArgSig {
    fn as_char(self) -> char {
        match self {
            ArgSig::Str => '$',
            ArgSig::Num => '#',
            ArgSig::Utf => '&',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub name: String,
    pub sig: ArgSig,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_type: String,
    pub op: Op,
    pub args: Vec<Argument>,
}

impl Message {
    pub fn new(msg_type: impl Into<String>, op: Op, args: Vec<Argument>) -> Self {
        Self {
            msg_type: msg_type.into(),
            op,
            args,
        }
    }

    /// Looks up an argument by name. The reference device never repeats an
    /// argument name within one message; if it did, the last one wins,
    /// matching the map-keyed-by-name behavior of the reference driver.
    pub fn arg(&self, name: &str) -> Option<&Argument> {
        self.args.iter().rev().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Message(Message, usize),
    Incomplete,
}

pub fn decode(input: &str) -> Result<Decoded, RouterError> {
    let Some(start) = input.find('~') else {
        return Ok(Decoded::Incomplete);
    };
    let Some(rel_end) = input[start..].find('\\') else {
        return Ok(Decoded::Incomplete);
    };
    let end = start + rel_end;
    let consumed = end + 1;
    let body = &input[start + 1..end];
    let message = parse_body(body)?;
    Ok(Decoded::Message(message, consumed))
}

fn parse_body(body: &str) -> Result<Message, RouterError> {
    let op_idx = body
        .find([':', '!', '?', '%'])
        .ok_or_else(|| RouterError::FrameParse(format!("no operation character in '{body}'")))?;
    let msg_type = body[..op_idx].to_owned();
    if msg_type.is_empty() {
        return Err(RouterError::FrameParse(format!(
            "empty message type in '{body}'"
        )));
    }
    let op = match &body[op_idx..=op_idx] {
        ":" => Op::Change,
        "!" => Op::ChangeNotify,
        "?" => Op::Query,
        "%" => Op::QueryResponse,
        other => unreachable!("unexpected operation character '{other}'"),
    };

    let args_str = &body[op_idx + 1..];
    let mut args = Vec::new();
    if !args_str.is_empty() {
        for arg_str in args_str.split(';') {
            args.push(parse_argument(arg_str)?);
        }
    }
    Ok(Message {
        msg_type,
        op,
        args,
    })
}

fn parse_argument(s: &str) -> Result<Argument, RouterError> {
    let sig_idx = s
        .find(['$', '#', '&'])
        .ok_or_else(|| RouterError::FrameParse(format!("no sigil in argument '{s}'")))?;
    let name = s[..sig_idx].to_owned();
    let sig = match &s[sig_idx..=sig_idx] {
        "$" => ArgSig::Str,
        "#" => ArgSig::Num,
        "&" => ArgSig::Utf,
        _ => unreachable!(),
    };
    if s.as_bytes().get(sig_idx + 1) != Some(&b'(') {
        return Err(RouterError::FrameParse(format!(
            "argument '{s}' missing opening '(' after sigil"
        )));
    }
    if !s.ends_with(')') || s.len() < sig_idx + 3 {
        return Err(RouterError::FrameParse(format!(
            "argument '{s}' missing closing ')'"
        )));
    }
    let payload = &s[sig_idx + 2..s.len() - 1];
    let values = payload.split(',').map(str::to_owned).collect();
    Ok(Argument { name, sig, values })
}

pub fn encode(msg: &Message) -> String {
    let mut body = format!("{}{}", msg.msg_type, msg.op.as_char());
    let arg_strs: Vec<String> = msg
        .args
        .iter()
        .map(|a| format!("{}{}({})", a.name, a.sig.as_char(), a.values.join(",")))
        .collect();
    body.push_str(&arg_strs.join(";"));
    format!("~{body}\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_channels_query_response() {
        let decoded = decode("~CHANNELS%I#(1,2,3);NAME$(SDI,AES,DATA)\\").unwrap();
        let Decoded::Message(msg, consumed) = decoded else {
            panic!("expected a message")
        };
        assert_eq!(consumed, "~CHANNELS%I#(1,2,3);NAME$(SDI,AES,DATA)\\".len());
        assert_eq!(msg.msg_type, "CHANNELS");
        assert_eq!(msg.op, Op::QueryResponse);
        assert_eq!(msg.arg("I").unwrap().values, vec!["1", "2", "3"]);
        assert_eq!(
            msg.arg("NAME").unwrap().values,
            vec!["SDI", "AES", "DATA"]
        );
    }

    #[test]
    fn decodes_query_with_no_arguments() {
        let decoded = decode("~CHANNELS?\\").unwrap();
        let Decoded::Message(msg, consumed) = decoded else {
            panic!("expected a message")
        };
        assert_eq!(consumed, 11);
        assert_eq!(msg.msg_type, "CHANNELS");
        assert_eq!(msg.op, Op::Query);
        assert!(msg.args.is_empty());
    }

    #[test]
    fn decodes_breakaway_xpoint_notify() {
        let decoded = decode("~XPOINT!D#(10.1);S#(20.1)\\").unwrap();
        let Decoded::Message(msg, _) = decoded else {
            panic!("expected a message")
        };
        assert_eq!(msg.op, Op::ChangeNotify);
        assert_eq!(msg.arg("D").unwrap().values, vec!["10.1"]);
        assert_eq!(msg.arg("S").unwrap().values, vec!["20.1"]);
    }

    #[test]
    fn decodes_lock_notify() {
        let decoded = decode("~LOCK!D#(10);V$(OFF)\\").unwrap();
        let Decoded::Message(msg, _) = decoded else {
            panic!("expected a message")
        };
        assert_eq!(msg.arg("D").unwrap().sig, ArgSig::Num);
        assert_eq!(msg.arg("V").unwrap().values, vec!["OFF"]);
    }

    #[test]
    fn empty_value_is_a_single_empty_string_element() {
        let decoded = decode("~XPOINT!D#(10.1);S#()\\").unwrap();
        let Decoded::Message(msg, _) = decoded else {
            panic!("expected a message")
        };
        assert_eq!(msg.arg("S").unwrap().values, vec![""]);
    }

    #[test]
    fn incomplete_without_terminator() {
        assert_eq!(decode("~CHANNELS?").unwrap(), Decoded::Incomplete);
    }

    #[test]
    fn incomplete_without_tilde() {
        assert_eq!(decode("garbage").unwrap(), Decoded::Incomplete);
    }

    #[test]
    fn missing_operation_character_is_a_frame_parse_error() {
        let err = decode("~CHANNELS\\").unwrap_err();
        assert!(matches!(err, RouterError::FrameParse(_)));
    }

    #[test]
    fn missing_sigil_is_a_frame_parse_error() {
        let err = decode("~DEST%NAME(MON-A)\\").unwrap_err();
        assert!(matches!(err, RouterError::FrameParse(_)));
    }

    #[test]
    fn missing_closing_paren_is_a_frame_parse_error() {
        let err = decode("~DEST%NAME$(MON-A\\").unwrap_err();
        assert!(matches!(err, RouterError::FrameParse(_)));
    }

    #[test]
    fn unknown_argument_name_is_retained_not_discarded() {
        let decoded = decode("~DEST%I#(10);NAME$(MON-A);COUNT#(4)\\").unwrap();
        let Decoded::Message(msg, _) = decoded else {
            panic!("expected a message")
        };
        assert_eq!(msg.args.len(), 3);
        assert_eq!(msg.arg("COUNT").unwrap().values, vec!["4"]);
    }

    fn round_trip(msg: Message) {
        let encoded = encode(&msg);
        let Decoded::Message(decoded, consumed) = decode(&encoded).unwrap() else {
            panic!("expected a message")
        };
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn round_trips_every_outgoing_shape() {
        round_trip(Message::new("CHANNELS", Op::Query, vec![]));
        round_trip(Message::new(
            "DEST",
            Op::Query,
            vec![Argument {
                name: "Q".to_owned(),
                sig: ArgSig::Str,
                values: vec!["NAME".to_owned(), "CHANNELS".to_owned()],
            }],
        ));
        round_trip(Message::new(
            "XPOINT",
            Op::Change,
            vec![
                Argument {
                    name: "D".to_owned(),
                    sig: ArgSig::Num,
                    values: vec!["10.1".to_owned()],
                },
                Argument {
                    name: "S".to_owned(),
                    sig: ArgSig::Num,
                    values: vec!["20.1".to_owned()],
                },
            ],
        ));
        round_trip(Message::new(
            "LOCK",
            Op::Change,
            vec![
                Argument {
                    name: "D".to_owned(),
                    sig: ArgSig::Num,
                    values: vec!["10".to_owned()],
                },
                Argument {
                    name: "V".to_owned(),
                    sig: ArgSig::Str,
                    values: vec!["OFF".to_owned()],
                },
            ],
        ));
    }
}
