use std::io::{self, BufRead, Write};

use memory_manager::Command;

use crate::{
    meta_commands::{handle_meta_command, MetaCommand},
    simulator::Simulator,
};

pub struct REPL {
    prompt: &'static str,
}

impl Default for REPL {
    fn default() -> Self {
        REPL { prompt: "vm> " }
    }
}

impl REPL {
    /// Next trimmed line, `None` once the input is exhausted.
    pub fn read_line<R: BufRead>(&self, input: &mut R) -> Result<Option<String>, io::Error> {
        let mut buffer = String::new();
        if input.read_line(&mut buffer)? == 0 {
            return Ok(None);
        }
        Ok(Some(buffer.trim().to_string()))
    }

    /// Reads commands until `.exit` or end of input.
    pub fn run<R: BufRead, W: Write>(
        &self,
        simulator: &mut Simulator,
        input: &mut R,
        out: &mut W,
    ) -> Result<(), io::Error> {
        loop {
            write!(out, "{}", self.prompt)?;
            out.flush()?;
            let line = match self.read_line(input)? {
                Some(line) => line,
                None => return Ok(()),
            };
            if line.is_empty() {
                continue;
            }
            if line.starts_with('.') {
                match handle_meta_command(&line, simulator, out) {
                    Ok(MetaCommand::Exit) => return Ok(()),
                    Ok(_) => {}
                    Err(e) => writeln!(out, "{}", e)?,
                }
                continue;
            }
            match line.parse::<Command>() {
                Ok(command) => {
                    let _ = simulator.step(&command, out)?;
                }
                Err(e) => writeln!(out, "{}", e)?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use memory_manager::{Geometry, MemoryManager};

    use super::*;

    #[test]
    fn session_until_exit() {
        let geometry = Geometry {
            page_size: 4,
            memory_size: 16,
            swap_size: 8,
        };
        let mut sim = Simulator::new(MemoryManager::init(geometry, "lru").unwrap());
        let mut input = "C p1 8\n\nA p1 3\nZ p1\n.stats\n.exit\nC p2 4\n".as_bytes();
        let mut out = Vec::new();
        REPL::default().run(&mut sim, &mut input, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("unknown operation 'Z'"));
        assert!(text.contains("2 commands, 1 accesses"));
        assert!(!sim.manager().page_table().contains("p2"));
    }

    #[test]
    fn end_of_input() {
        let repl = REPL::default();
        let mut input = "".as_bytes();
        assert_eq!(repl.read_line(&mut input).unwrap(), None);
    }
}
