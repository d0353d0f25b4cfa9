use anyhow::Result;
use clap::Parser;
use futures::{SinkExt, StreamExt};
use ttlkv::{
    common::{codec::RESP3Codec, command_line::command_line_frame},
    tui_client::cli::Args,
};
use tokio::{net::TcpStream, time::Instant};
use tokio_util::codec::Framed;

use std::borrow::Cow::{self, Borrowed, Owned};

use rustyline::{
    error::ReadlineError,
    highlight::{Highlighter, MatchingBracketHighlighter},
    hint::HistoryHinter,
    Completer, CompletionType, Config, EditMode, Editor, Helper, Hinter, Validator,
};

#[derive(Helper, Completer, Hinter, Validator)]
struct ReplHelper {
    highlighter: MatchingBracketHighlighter,
    #[rustyline(Hinter)]
    hinter: HistoryHinter,
    colored_prompt: String,
}

impl Highlighter for ReplHelper {
    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(
        &'s self,
        prompt: &'p str,
        default: bool,
    ) -> Cow<'b, str> {
        if default {
            Borrowed(&self.colored_prompt)
        } else {
            Borrowed(prompt)
        }
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Owned("\x1b[1m".to_owned() + hint + "\x1b[m")
    }

    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        self.highlighter.highlight(line, pos)
    }

    fn highlight_char(&self, line: &str, pos: usize, forced: bool) -> bool {
        self.highlighter.highlight_char(line, pos, forced)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args { host, port } = Args::parse();
    let addr = format!("{}:{}", host, port);
    let tcp = TcpStream::connect(&addr).await?;
    let (mut sink, mut stream) = Framed::new(tcp, RESP3Codec).split();

    let config = Config::builder()
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .edit_mode(EditMode::Emacs)
        .build();
    let h = ReplHelper {
        highlighter: MatchingBracketHighlighter::new(),
        hinter: HistoryHinter::new(),
        colored_prompt: "".to_owned(),
    };

    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(h));

    let p = format!("{}> ", addr);

    loop {
        if let Some(helper) = rl.helper_mut() {
            helper.colored_prompt = format!("\x1b[1;32m{p}\x1b[0m");
        }
        let readline = rl.readline(&p);

        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;

                let trimmed = line.trim();
                if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
                    break;
                }

                let request = match command_line_frame(&line) {
                    Ok(Some(request)) => request,
                    Ok(None) => continue,
                    Err(err) => {
                        println!("{}", err);
                        continue;
                    }
                };

                let start = Instant::now();

                sink.send(request).await?;
                let response = stream.next().await;

                if let Some(Ok(response)) = response {
                    let time = start.elapsed();
                    println!("{} in {:?}", response, time);
                } else {
                    eprintln!("Failed to receive response");
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                break;
            }
            Err(ReadlineError::Eof) => {
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    println!("Shutting down.");
    Ok(())
}
