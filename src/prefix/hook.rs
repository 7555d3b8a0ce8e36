use async_trait::async_trait;
use tracing::trace;

use super::Prefix;
use crate::transport::{Arg, CacheError, Command, KvTransport, Value};

/// Where a command keeps its keys. Offsets count the command name as 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLayout {
    /// `MSET k1 v1 k2 v2`: every other argument from offset 1.
    Pairs,
    /// `DEL k1 k2 ...`: every argument from offset 1.
    All,
    /// `RENAME src dst`: offsets 1 and 2.
    FirstTwo,
    /// `ZUNIONSTORE dst numkeys k1 ...`: offset 1, then `numkeys` keys from offset 3.
    DestinationWithCount,
    /// `EVAL script numkeys k1 ... arg ...`: `numkeys` keys from offset 3.
    CountedAfterScript,
    /// `BLPOP k1 k2 timeout`: everything between the name and the last argument.
    AllButLast,
    /// No keys at all.
    None,
    /// Single key at offset 1.
    First,
}

impl KeyLayout {
    pub fn of(command_name: &str) -> Self {
        match command_name.to_ascii_lowercase().as_str() {
            "mset" | "msetnx" => KeyLayout::Pairs,
            "mget" | "exists" | "del" | "unlink" | "touch" | "watch" | "sdiff" | "sinter" | "sunion"
            | "sdiffstore" | "sinterstore" | "sunionstore" | "pfcount" | "pfmerge" => KeyLayout::All,
            "rename" | "renamenx" | "rpoplpush" | "brpoplpush" | "lmove" | "blmove" | "smove" | "copy" => {
                KeyLayout::FirstTwo
            }
            "zinterstore" | "zunionstore" | "zdiffstore" => KeyLayout::DestinationWithCount,
            "eval" | "evalsha" | "eval_ro" | "evalsha_ro" | "fcall" | "fcall_ro" => KeyLayout::CountedAfterScript,
            "blpop" | "brpop" | "bzpopmin" | "bzpopmax" => KeyLayout::AllButLast,
            "script" | "function" | "ping" | "echo" | "info" | "dbsize" | "flushdb" | "flushall" | "time"
            | "multi" | "exec" | "discard" | "unwatch" | "select" | "client" | "config" | "auth"
            | "hello" | "quit" => KeyLayout::None,
            _ => KeyLayout::First,
        }
    }

    /// Offsets holding keys in `args`. Out-of-range offsets are never returned.
    pub fn key_offsets(self, args: &[Arg]) -> Vec<usize> {
        let len = args.len();
        if len < 2 {
            return Vec::new();
        }
        match self {
            KeyLayout::Pairs => (1..len).step_by(2).collect(),
            KeyLayout::All => (1..len).collect(),
            KeyLayout::FirstTwo => (1..len.min(3)).collect(),
            KeyLayout::DestinationWithCount => {
                let mut offsets = vec![1];
                offsets.extend(counted_keys(args));
                offsets
            }
            KeyLayout::CountedAfterScript => counted_keys(args).collect(),
            KeyLayout::AllButLast => (1..len - 1).collect(),
            KeyLayout::None => Vec::new(),
            KeyLayout::First => vec![1],
        }
    }
}

/// Keys counted by the argument at offset 2, starting at offset 3.
fn counted_keys(args: &[Arg]) -> impl Iterator<Item = usize> {
    let count = args
        .get(2)
        .and_then(Arg::as_int)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0);
    let end = 3usize.saturating_add(count).min(args.len());
    3..end.max(3)
}

impl Prefix {
    /// Prefix every key-bearing, string-shaped argument of `cmd` in place.
    pub fn rewrite(&self, cmd: &mut Command) {
        if self.is_empty() {
            return;
        }
        let layout = KeyLayout::of(cmd.name());
        let offsets = layout.key_offsets(cmd.args());
        let args = cmd.args_mut();
        for i in offsets {
            if let Arg::Str(key) = &mut args[i] {
                *key = self.make_key(key);
            }
        }
    }
}

/// Decorates a transport so every outgoing command, alone or inside a
/// pipeline, has its keys namespaced before it is sent.
pub struct PrefixedTransport<T> {
    inner: T,
    prefix: Prefix,
}

impl<T: KvTransport> PrefixedTransport<T> {
    pub fn new(inner: T, prefix: impl Into<Prefix>) -> Self {
        Self { inner, prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: KvTransport> KvTransport for PrefixedTransport<T> {
    async fn exec(&self, mut cmd: Command) -> Result<Value, CacheError> {
        self.prefix.rewrite(&mut cmd);
        trace!(command = cmd.name(), prefix = %self.prefix, "prefixed command");
        self.inner.exec(cmd).await
    }

    async fn exec_pipeline(
        &self,
        mut cmds: Vec<Command>,
    ) -> Result<Vec<Result<Value, CacheError>>, CacheError> {
        for cmd in &mut cmds {
            self.prefix.rewrite(cmd);
        }
        self.inner.exec_pipeline(cmds).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use std::time::Duration;

    fn rewritten(prefix: &str, cmd: Command) -> Vec<Arg> {
        let mut cmd = cmd;
        Prefix::new(prefix).rewrite(&mut cmd);
        cmd.args().to_vec()
    }

    fn strs(items: &[&str]) -> Vec<Arg> {
        items.iter().map(|s| Arg::from(*s)).collect()
    }

    #[test]
    fn test_default_single_key() {
        let args = rewritten("p", Command::new("get").arg("k"));
        assert_eq!(args, strs(&["get", "p:k"]));

        let args = rewritten("p", Command::new("HSET").arg("h").arg("field").arg("v"));
        assert_eq!(args, strs(&["HSET", "p:h", "field", "v"]));
    }

    #[test]
    fn test_pairwise_keys() {
        let args = rewritten("p", Command::new("MSET").arg("a").arg("1").arg("b").arg("2"));
        assert_eq!(args, strs(&["MSET", "p:a", "1", "p:b", "2"]));
    }

    #[test]
    fn test_flat_multi_key() {
        let args = rewritten("p", Command::new("del").arg("a").arg("b").arg("c"));
        assert_eq!(args, strs(&["del", "p:a", "p:b", "p:c"]));

        let args = rewritten("p", Command::new("SUNIONSTORE").arg("dst").arg("s1").arg("s2"));
        assert_eq!(args, strs(&["SUNIONSTORE", "p:dst", "p:s1", "p:s2"]));
    }

    #[test]
    fn test_two_key_commands() {
        let args = rewritten("p", Command::new("RENAME").arg("old").arg("new"));
        assert_eq!(args, strs(&["RENAME", "p:old", "p:new"]));

        let cmd = Command::new("BRPOPLPUSH").arg("src").arg("dst").arg(5);
        let args = rewritten("p", cmd);
        assert_eq!(args[1..3], strs(&["p:src", "p:dst"])[..]);
        assert_eq!(args[3], Arg::Int(5));
    }

    #[test]
    fn test_destination_with_count() {
        let cmd = Command::new("ZUNIONSTORE")
            .arg("out")
            .arg(2)
            .arg("z1")
            .arg("z2")
            .arg("WEIGHTS")
            .arg(1)
            .arg(2);
        let args = rewritten("p", cmd);
        assert_eq!(args[1], Arg::from("p:out"));
        assert_eq!(args[2], Arg::Int(2));
        assert_eq!(args[3..5], strs(&["p:z1", "p:z2"])[..]);
        assert_eq!(args[5], Arg::from("WEIGHTS"));
    }

    #[test]
    fn test_count_larger_than_arguments_is_clamped() {
        let cmd = Command::new("ZINTERSTORE").arg("out").arg(10).arg("z1");
        let args = rewritten("p", cmd);
        assert_eq!(args[3], Arg::from("p:z1"));
        assert_eq!(args.len(), 4);
    }

    #[test]
    fn test_eval_leaves_script_and_args_alone() {
        let cmd = Command::new("EVAL")
            .arg("return redis.call('get', KEYS[1])")
            .arg(1)
            .arg("k1")
            .arg("argv1");
        let args = rewritten("p", cmd);
        assert_eq!(args[1], Arg::from("return redis.call('get', KEYS[1])"));
        assert_eq!(args[3], Arg::from("p:k1"));
        assert_eq!(args[4], Arg::from("argv1"));
    }

    #[test]
    fn test_eval_with_textual_count() {
        let cmd = Command::new("evalsha").arg("abc123").arg("2").arg("k1").arg("k2");
        let args = rewritten("p", cmd);
        assert_eq!(args[3..5], strs(&["p:k1", "p:k2"])[..]);
    }

    #[test]
    fn test_blocking_pop_keeps_timeout() {
        let args = rewritten("p", Command::new("BLPOP").arg("l1").arg("l2").arg("0"));
        assert_eq!(args, strs(&["BLPOP", "p:l1", "p:l2", "0"]));
    }

    #[test]
    fn test_script_commands_exempt() {
        let args = rewritten("p", Command::new("SCRIPT").arg("LOAD").arg("return 1"));
        assert_eq!(args, strs(&["SCRIPT", "LOAD", "return 1"]));
    }

    #[test]
    fn test_non_string_arguments_untouched() {
        let cmd = Command::new("DEL").arg(7).arg(b"raw".to_vec()).arg("k");
        let args = rewritten("p", cmd);
        assert_eq!(args[1], Arg::Int(7));
        assert_eq!(args[2], Arg::Bytes(b"raw".to_vec()));
        assert_eq!(args[3], Arg::from("p:k"));
    }

    #[test]
    fn test_short_commands_pass_through() {
        assert_eq!(rewritten("p", Command::new("PING")), strs(&["PING"]));
        assert_eq!(rewritten("p", Command::new("GET")), strs(&["GET"]));
    }

    #[test]
    fn test_empty_prefix_is_identity() {
        let args = rewritten("", Command::new("MSET").arg("a").arg("1"));
        assert_eq!(args, strs(&["MSET", "a", "1"]));
    }

    #[tokio::test]
    async fn test_transport_prefixes_single_and_pipelined_commands() {
        let transport = PrefixedTransport::new(MemoryTransport::new(), "ns");

        transport.exec(Command::set("a", "1", Duration::ZERO)).await.unwrap();
        transport
            .exec_pipeline(vec![Command::set("b", "2", Duration::ZERO), Command::set("c", "3", Duration::ZERO)])
            .await
            .unwrap();

        assert_eq!(transport.inner().keys(), vec!["ns:a", "ns:b", "ns:c"]);

        let got = transport.exec(Command::get("b")).await.unwrap();
        assert_eq!(got, Value::Data(b"2".to_vec()));
    }
}
