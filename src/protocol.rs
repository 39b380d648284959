use std::{
    fmt,
    io::{Error, ErrorKind, Read, Result, Write},
};

pub trait Serialize<T> {
    fn serialize(self, bytes: &mut T) -> Result<()>;
}

pub trait Deserialize<T> {
    fn deserialize(bytes: &mut T) -> Result<Self>
    where
        Self: Sized;
}

/// A command understood by the server. The discriminant is the byte sent on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    DateTime = 0x11,
    Uptime = 0x22,
    Memory = 0x33,
    Netstat = 0x44,
    Users = 0x55,
    Processes = 0x66,
}

impl Command {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(code: u8) -> std::result::Result<Self, u8> {
        match code {
            0x11 => Ok(Command::DateTime),
            0x22 => Ok(Command::Uptime),
            0x33 => Ok(Command::Memory),
            0x44 => Ok(Command::Netstat),
            0x55 => Ok(Command::Users),
            0x66 => Ok(Command::Processes),
            n => Err(n),
        }
    }
}

impl<T: Write> Serialize<T> for Command {
    fn serialize(self, bytes: &mut T) -> Result<()> {
        bytes.write_all(&[self.code()])?;
        bytes.flush()
    }
}

/// Reads a single command byte.
///
/// A stream that ends before the byte arrives yields `UnexpectedEof`, and a byte that
/// doesn't name a command yields `InvalidData`.
impl<T: Read> Deserialize<T> for Command {
    fn deserialize(bytes: &mut T) -> Result<Self> {
        let mut code = [0u8; 1];
        bytes.read_exact(&mut code)?;

        Command::try_from(code[0]).map_err(|n| {
            Error::new(
                ErrorKind::InvalidData,
                format!("unknown command: {n:#04x}"),
            )
        })
    }
}

/// A request kind the client can make, as presented to users.
#[derive(Debug, PartialEq, Eq)]
pub struct Operation {
    /// The command sent to the server.
    pub command: Command,

    /// What the operation does, shown in menus.
    pub description: &'static str,

    /// Words that select this operation. The first one is its short name.
    pub nicknames: &'static [&'static str],
}

impl Operation {
    pub fn code(&self) -> u8 {
        self.command.code()
    }

    pub fn short_name(&self) -> &'static str {
        self.nicknames[0]
    }

    /// Returns true if `text` equals any nickname, ignoring case.
    pub fn matches(&self, text: &str) -> bool {
        self.nicknames
            .iter()
            .any(|nick| nick.eq_ignore_ascii_case(text))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Every operation, in menu order. Nicknames are mutually exclusive across the table.
pub static OPERATIONS: [Operation; 6] = [
    Operation {
        command: Command::DateTime,
        description: "Get host date & time",
        nicknames: &["date", "time"],
    },
    Operation {
        command: Command::Uptime,
        description: "Get host uptime",
        nicknames: &["uptime"],
    },
    Operation {
        command: Command::Memory,
        description: "Get host memory usage",
        nicknames: &["memory", "mem", "free"],
    },
    Operation {
        command: Command::Netstat,
        description: "Get host netstat output",
        nicknames: &["netstat"],
    },
    Operation {
        command: Command::Users,
        description: "Get host current users",
        nicknames: &["users", "who"],
    },
    Operation {
        command: Command::Processes,
        description: "Get host running processes",
        nicknames: &["processes", "process", "ps"],
    },
];

/// The outcome of looking up user input in the operation table.
#[derive(Debug, PartialEq, Eq)]
pub enum Lookup {
    /// `0`, which menus treat as a request to quit.
    Quit,
    Found(&'static Operation),
    /// Menu positions (1-based) of every operation the input matched.
    Ambiguous(Vec<usize>),
    NotFound,
}

/// Resolves a menu number (1-based, punctuation ignored) or a nickname.
pub fn lookup(input: &str) -> Lookup {
    let input = input.trim();
    let digits: String = input
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();

    if let Ok(choice) = digits.parse::<usize>() {
        return match choice {
            0 => Lookup::Quit,
            n if n <= OPERATIONS.len() => Lookup::Found(&OPERATIONS[n - 1]),
            _ => Lookup::NotFound,
        };
    }

    let matches: Vec<usize> = OPERATIONS
        .iter()
        .enumerate()
        .filter(|(_, op)| op.matches(input))
        .map(|(i, _)| i + 1)
        .collect();

    match matches.as_slice() {
        [] => Lookup::NotFound,
        [position] => Lookup::Found(&OPERATIONS[position - 1]),
        _ => Lookup::Ambiguous(matches),
    }
}

/// Like [`lookup`], but only an unambiguous match counts.
pub fn parse_operation(input: &str) -> Option<&'static Operation> {
    match lookup(input) {
        Lookup::Found(op) => Some(op),
        _ => None,
    }
}
