//! Command handler for the line-oriented host

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rowcache::{Cache, Record};

/// Response to one command line
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Command succeeded without a payload
    Ok,
    /// A text value
    Value(String),
    /// Key not found
    Nil,
    /// A count
    Integer(i64),
    /// Multi-line report
    Info(String),
    /// Command failed
    Error(String),
    /// Client asked to stop
    Quit,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => write!(f, "OK"),
            Reply::Value(v) => write!(f, "\"{}\"", v),
            Reply::Nil => write!(f, "(nil)"),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Info(text) => write!(f, "{}", text.trim_end()),
            Reply::Error(msg) => write!(f, "(error) {}", msg),
            Reply::Quit => write!(f, "BYE"),
        }
    }
}

pub struct CommandHandler {
    cache: Arc<Cache<String>>,
}

impl CommandHandler {
    pub fn new(cache: Arc<Cache<String>>) -> Self {
        Self { cache }
    }

    pub fn handle(&self, line: &str) -> Reply {
        let args: Vec<&str> = line.split_whitespace().collect();
        let Some((command, args)) = args.split_first() else {
            return Reply::Error("ERR empty command".to_string());
        };

        match command.to_uppercase().as_str() {
            "PING" => Reply::Value("PONG".to_string()),
            "GET" => self.handle_get(args),
            "SET" => self.handle_set(args),
            "DEL" => self.handle_del(args),
            "EXISTS" => self.handle_exists(args),
            "LEN" => Reply::Integer(self.cache.len() as i64),
            "FLUSH" => self.handle_flush(),
            "STATS" => self.handle_stats(),
            "QUIT" | "EXIT" => Reply::Quit,
            other => Reply::Error(format!("ERR unknown command '{}'", other)),
        }
    }

    fn handle_get(&self, args: &[&str]) -> Reply {
        let [key] = args else {
            return Reply::Error("ERR wrong number of arguments for 'get' command".to_string());
        };

        match self.cache.get(key) {
            Some(record) if !record.is_reclaimable(Instant::now()) => Reply::Value(record.value),
            _ => Reply::Nil,
        }
    }

    fn handle_set(&self, args: &[&str]) -> Reply {
        let (key, value, ttl) = match args {
            [key, value] => (*key, *value, None),
            [key, value, ttl] => match ttl.parse::<u64>() {
                Ok(secs) => (*key, *value, Some(Duration::from_secs(secs))),
                Err(_) => return Reply::Error("ERR ttl is not an integer".to_string()),
            },
            _ => {
                return Reply::Error("ERR wrong number of arguments for 'set' command".to_string())
            }
        };

        let mut record = Record::new(key, value.to_string());
        if let Some(ttl) = ttl {
            record = record.with_ttl(ttl);
        }

        match self.cache.set(record) {
            Ok(()) => Reply::Ok,
            Err(e) => Reply::Error(format!("ERR {}", e)),
        }
    }

    fn handle_del(&self, args: &[&str]) -> Reply {
        if args.is_empty() {
            return Reply::Error("ERR wrong number of arguments for 'del' command".to_string());
        }

        let mut deleted = 0i64;
        for key in args {
            if self.is_live(key) {
                self.cache.del(key);
                deleted += 1;
            }
        }
        Reply::Integer(deleted)
    }

    fn handle_exists(&self, args: &[&str]) -> Reply {
        if args.is_empty() {
            return Reply::Error(
                "ERR wrong number of arguments for 'exists' command".to_string(),
            );
        }

        let count = args
            .iter()
            .filter(|key| self.is_live(key))
            .count();
        Reply::Integer(count as i64)
    }

    /// Deleted or past-deadline records stay indexed until swept
    fn is_live(&self, key: &str) -> bool {
        self.cache
            .peek(key)
            .is_some_and(|record| !record.is_reclaimable(Instant::now()))
    }

    fn handle_flush(&self) -> Reply {
        match self.cache.flush() {
            Ok(()) => Reply::Ok,
            Err(e) => Reply::Error(format!("ERR {}", e)),
        }
    }

    fn handle_stats(&self) -> Reply {
        let stats = self.cache.stats();
        let info = format!(
            "# Index\n\
             keys:{}\n\
             capacity:{}\n\
             \n\
             # Stats\n\
             hits:{}\n\
             misses:{}\n\
             hit_ratio:{:.2}\n\
             inserts:{}\n\
             updates:{}\n\
             promotions:{}\n\
             expired:{}\n\
             evictions:{}\n",
            self.cache.len(),
            self.cache.capacity(),
            stats.hits(),
            stats.misses(),
            stats.hit_ratio(),
            stats.inserts(),
            stats.updates(),
            stats.promotions(),
            stats.expired(),
            stats.evictions(),
        );
        Reply::Info(info)
    }
}
