use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io;

pub enum Command {
  Step(u32), // Step N cycles
  Continue,
  Info,
  Dump(u16, u16), // address, vector count
  Quit,
}

const HELP: &str =
  "Enter to step, 'si N' to step N cycles, 'c' to continue, 'i' for state, 'x ADDR [N]' to dump the buffer, 'q' to quit";

/// Line-editing prompt for step mode
pub struct Shell {
  editor: DefaultEditor,
}

fn parse_number(token: &str) -> Result<u32, String> {
  let parsed = match token.strip_prefix("0x") {
    Some(hex) => u32::from_str_radix(hex, 16),
    None => token.parse::<u32>(),
  };
  parsed.map_err(|e| format!("invalid number '{}': {}", token, e))
}

/// Parse one shell line. `Ok(None)` means the line was blank.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
  let mut words = line.split_whitespace();
  let Some(head) = words.next() else {
    return Ok(None);
  };
  let args: Vec<&str> = words.collect();

  match head {
    "si" => {
      let Some(count) = args.first() else {
        return Err("'si' requires a number, e.g., 'si 100'".to_string());
      };
      match parse_number(count)? {
        0 => Err("step count must be greater than 0".to_string()),
        n => Ok(Some(Command::Step(n))),
      }
    },
    "c" => Ok(Some(Command::Continue)),
    "i" => Ok(Some(Command::Info)),
    "x" => {
      let Some(addr) = args.first() else {
        return Err("'x' requires an address, e.g., 'x 0x10 4'".to_string());
      };
      let addr = parse_number(addr)? as u16;
      let count = match args.get(1) {
        Some(n) => parse_number(n)? as u16,
        None => 1,
      };
      Ok(Some(Command::Dump(addr, count)))
    },
    "q" => Ok(Some(Command::Quit)),
    other => Err(format!("Unknown command: '{}'. {}", other, HELP)),
  }
}

impl Shell {
  pub fn new() -> io::Result<Self> {
    let editor = DefaultEditor::new().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    Ok(Self { editor })
  }

  pub fn read_command(&mut self) -> io::Result<Command> {
    loop {
      match self.editor.readline("(tinynpu) ") {
        Ok(line) => {
          let trimmed = line.trim();
          if !trimmed.is_empty() {
            let _ = self.editor.add_history_entry(trimmed);
          }
          match parse_command(trimmed) {
            // Empty input: step once
            Ok(None) => return Ok(Command::Step(1)),
            Ok(Some(cmd)) => return Ok(cmd),
            Err(msg) => eprintln!("Error: {}", msg),
          }
        },
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(Command::Quit),
        Err(err) => return Err(io::Error::new(io::ErrorKind::Other, err)),
      }
    }
  }
}
