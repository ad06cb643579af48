use std::{
  io::{self, Read, Write},
  process::ExitCode,
};

use rfreelist::{FreeList, List, MappedArena, config::ArenaConfig, logging};

/// Reads characters from stdin and drives a list stored in the arena:
///
/// - `a` inserts the running count at the head
/// - `b` does nothing
/// - `c` deletes the head
///
/// Every `a`, `b` or `c` bumps the count. Any other character (or end of
/// input) stops the loop, after which the list is printed and freed.
fn main() -> ExitCode {
  let config = ArenaConfig::from_env();
  logging::init(config.log_level);

  let mut arena = match MappedArena::new(config.arena_size) {
    Ok(arena) => arena,
    Err(err) => {
      eprintln!("cannot map arena: {err}");
      return ExitCode::FAILURE;
    }
  };
  let mut heap = FreeList::from_arena(&mut arena);
  let mut list = List::new(&mut heap);

  let mut count = 0;

  for byte in io::stdin().lock().bytes() {
    let Ok(byte) = byte else {
      break;
    };

    match byte {
      b'a' => {
        if let Err(err) = list.push(count) {
          eprintln!("cannot add {count}: {err}");
          return ExitCode::FAILURE;
        }
      }
      b'b' => {}
      b'c' => {
        list.delete();
      }
      _ => break,
    }

    count += 1;
  }

  let mut stdout = io::stdout().lock();
  if writeln!(stdout, "{list}").is_err() {
    return ExitCode::FAILURE;
  }

  list.clear();
  ExitCode::SUCCESS
}
