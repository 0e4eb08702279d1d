//! Interactive REPL-style command-line interface client.

use std::io::{self, Write};
use std::str::SplitWhitespace;

use plasma::{
    pf_debug, PlacementRing, PlasmaError, QuorumClient, Request, Response,
};

/// Prompt string at the start of line.
const PROMPT: &str = "Enter command: ";

/// Indented prompt used when a command needs more input.
const FIELD_INDENT: &str = "    ";

/// Recognizable command types.
#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    /// Request voted on by the replicas `send()` picks.
    Quorum(Request),

    /// Fetch the ring from replica 0 and summarize it.
    State,

    /// Print help message.
    PrintHelp,

    /// Client exit.
    Exit,

    /// Nothing read.
    Nothing,
}

/// Interactive REPL-style client struct.
pub(crate) struct ClientRepl {
    /// Quorum client connected to the cluster.
    client: QuorumClient,

    /// User input buffer.
    input_buf: String,
}

impl ClientRepl {
    /// Creates a new REPL-style client.
    pub(crate) fn new(client: QuorumClient) -> Self {
        ClientRepl {
            client,
            input_buf: String::new(),
        }
    }

    /// Prints the prompt string.
    fn print_prompt() {
        print!("{}", PROMPT);
        let _ = io::stdout().flush();
    }

    /// Prints (optionally) an error message and the help message.
    fn print_help(err: Option<&PlasmaError>) {
        if let Some(e) = err {
            println!("Error: {}", e);
        }
        println!("Commands:");
        println!("    ping");
        println!("    start");
        println!("    stop");
        println!("    read [key]");
        println!("    write [key [value]]");
        println!("    getstate");
        println!("    help");
        println!("    exit");
        println!("Missing keys and values are asked for interactively");
        let _ = io::stdout().flush();
    }

    /// Asks for one more line of input, trimmed.
    fn ask_stdin(label: &str) -> Result<String, PlasmaError> {
        print!("{}{}", FIELD_INDENT, label);
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    }

    /// Takes the next segment, or asks for it when the line ran out.
    fn next_or_ask<F>(
        segs: &mut SplitWhitespace,
        label: &str,
        ask: &mut F,
    ) -> Result<String, PlasmaError>
    where
        F: FnMut(&str) -> Result<String, PlasmaError>,
    {
        match segs.next() {
            Some(seg) => Ok(seg.to_string()),
            None => ask(label),
        }
    }

    /// Parses one input line into a command, asking for missing fields
    /// through `ask`.
    fn parse_command<F>(
        line: &str,
        ask: &mut F,
    ) -> Result<ReplCommand, PlasmaError>
    where
        F: FnMut(&str) -> Result<String, PlasmaError>,
    {
        let mut segs = line.split_whitespace();
        let Some(cmd_type) = segs.next() else {
            return Ok(ReplCommand::Nothing);
        };

        // command names match case-insensitively, keys and values as-is
        match &cmd_type.to_lowercase()[..] {
            "ping" => Ok(ReplCommand::Quorum(Request::Ping)),
            "start" => Ok(ReplCommand::Quorum(Request::Start)),
            "stop" => Ok(ReplCommand::Quorum(Request::Stop)),

            "read" => {
                let key = Self::next_or_ask(&mut segs, "Enter key: ", ask)?;
                Ok(ReplCommand::Quorum(Request::read(key)?))
            }

            "write" => {
                let key = Self::next_or_ask(&mut segs, "Enter key: ", ask)?;
                let value =
                    Self::next_or_ask(&mut segs, "Enter value: ", ask)?;
                Ok(ReplCommand::Quorum(Request::write(key, value)?))
            }

            "getstate" => Ok(ReplCommand::State),
            "help" => Ok(ReplCommand::PrintHelp),
            "exit" => Ok(ReplCommand::Exit),

            _ => Err(PlasmaError::msg(format!(
                "the command '{}' is not a valid command",
                cmd_type
            ))),
        }
    }

    /// Reads in user input and parses into a command.
    fn read_command(&mut self) -> Result<ReplCommand, PlasmaError> {
        self.input_buf.clear();
        let nread = io::stdin().read_line(&mut self.input_buf)?;
        if nread == 0 {
            return Ok(ReplCommand::Exit);
        }
        Self::parse_command(&self.input_buf, &mut Self::ask_stdin)
    }

    /// Renders the ring fetched through `GetState`.
    fn summarize_state(&self, reply: &Response) -> Result<String, PlasmaError> {
        if !reply.is_success() {
            return Ok(reply.describe());
        }
        let definition = self.client.definition();
        let ring = PlacementRing::from_state_bytes(
            definition.server_count,
            definition.server_copy_count,
            reply.body(),
        )?;
        Ok(format!(
            "{} routable slots, {} shunted, owners {:?}",
            ring.num_routable(),
            ring.num_shunted(),
            ring.owner_histogram()
        ))
    }

    /// One iteration of the REPL loop.
    async fn iter(&mut self) -> Result<bool, PlasmaError> {
        Self::print_prompt();

        let cmd = match self.read_command() {
            Ok(cmd) => cmd,
            Err(e) => {
                Self::print_help(Some(&e));
                return Ok(true);
            }
        };
        pf_debug!(format!("c{}", self.client.id()); "command {:?}", cmd);

        match cmd {
            ReplCommand::Exit => {
                println!("Exiting...");
                Ok(false)
            }

            ReplCommand::Nothing => Ok(true),

            ReplCommand::PrintHelp => {
                Self::print_help(None);
                Ok(true)
            }

            ReplCommand::Quorum(request) => {
                let reply = self.client.send(&request).await?;
                println!("Response: {}", reply.describe());
                Ok(true)
            }

            ReplCommand::State => {
                let reply = self.client.send_to(&Request::GetState, 0).await?;
                println!("Response: {}", self.summarize_state(&reply)?);
                Ok(true)
            }
        }
    }

    /// Runs the REPL loop until `exit` or end of input, then shuts the
    /// client down.
    pub(crate) async fn run(&mut self) -> Result<(), PlasmaError> {
        println!("For help, use command 'help'.");
        loop {
            match self.iter().await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => println!("Error: {}", e),
            }
        }
        self.client.shutdown().await
    }
}
