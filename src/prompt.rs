//! Interactive session prompts.
//!
//! Reads answers from any [`BufRead`] and writes questions to any [`Write`],
//! so the session can be driven from tests.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// What the user asked for from the main menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MenuChoice {
    /// `1`: a CSV file of requests.
    Csv(PathBuf),
    /// `2`: a title to search for.
    Title(String),
    /// `3`: a title with an explicit mirror page.
    TitleWithLink { title: String, link: String },
}

/// Post-batch answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FinishChoices {
    pub(crate) send: bool,
    pub(crate) clear: bool,
}

pub(crate) struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub(crate) fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Prints `question` and returns the trimmed answer. End of input reads as "".
    fn ask(&mut self, question: &str) -> io::Result<String> {
        write!(self.output, "{question}")?;
        self.output.flush()?;
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(line.trim().to_string())
    }

    fn ask_yes_no(&mut self, question: &str) -> io::Result<bool> {
        Ok(self.ask(question)?.eq_ignore_ascii_case("y"))
    }

    /// Shows the main menu. `None` means the choice was invalid and the session ends.
    pub(crate) fn menu(&mut self) -> io::Result<Option<MenuChoice>> {
        let choice = self.ask(
            "Enter 1 to read from a CSV file, 2 to enter the book name manually, \
             or 3 to provide the book name and download link: ",
        )?;
        let picked = match choice.as_str() {
            "1" => MenuChoice::Csv(PathBuf::from(
                self.ask("Enter the location of the CSV file: ")?,
            )),
            "2" => MenuChoice::Title(self.ask("Enter the name of the book: ")?),
            "3" => {
                let title = self.ask("Enter the name of the book: ")?;
                let link = self.ask("Enter the download link of the book: ")?;
                MenuChoice::TitleWithLink { title, link }
            }
            _ => {
                writeln!(self.output, "Invalid choice. Please enter 1, 2, or 3.")?;
                return Ok(None);
            }
        };
        Ok(Some(picked))
    }

    pub(crate) fn another(&mut self) -> io::Result<bool> {
        self.ask_yes_no("Do you want to scrape another book? (y/n): ")
    }

    /// Both questions are always asked before either runs.
    pub(crate) fn finish_choices(&mut self) -> io::Result<FinishChoices> {
        let send = self.ask_yes_no("Do you want to send the books to your email? (y/n): ")?;
        let clear = self.ask_yes_no("Do you want to clear the books folder? (y/n): ")?;
        Ok(FinishChoices { send, clear })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn prompter(input: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
        Prompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_menu_csv_choice_reads_path() {
        let mut p = prompter("1\n  books.csv \n");
        assert_eq!(
            p.menu().unwrap(),
            Some(MenuChoice::Csv(PathBuf::from("books.csv")))
        );
    }

    #[test]
    fn test_menu_title_choice_reads_title() {
        let mut p = prompter("2\nDune\n");
        assert_eq!(
            p.menu().unwrap(),
            Some(MenuChoice::Title("Dune".to_string()))
        );
    }

    #[test]
    fn test_menu_link_choice_reads_title_then_link() {
        let mut p = prompter("3\nDune\nhttps://mirror.example/dune\n");
        assert_eq!(
            p.menu().unwrap(),
            Some(MenuChoice::TitleWithLink {
                title: "Dune".to_string(),
                link: "https://mirror.example/dune".to_string(),
            })
        );
    }

    #[test]
    fn test_menu_invalid_choice_ends_session() {
        let mut p = prompter("4\n");
        assert_eq!(p.menu().unwrap(), None);
        let shown = String::from_utf8(p.output).unwrap();
        assert!(shown.contains("Invalid choice"));
    }

    #[test]
    fn test_menu_at_end_of_input_is_invalid() {
        let mut p = prompter("");
        assert_eq!(p.menu().unwrap(), None);
    }

    #[test]
    fn test_another_accepts_only_y() {
        assert!(prompter("Y\n").another().unwrap());
        assert!(!prompter("yes\n").another().unwrap());
        assert!(!prompter("n\n").another().unwrap());
    }

    #[test]
    fn test_finish_choices_asks_both_questions() {
        let mut p = prompter("y\nn\n");
        assert_eq!(
            p.finish_choices().unwrap(),
            FinishChoices {
                send: true,
                clear: false
            }
        );
        let shown = String::from_utf8(p.output).unwrap();
        assert!(shown.contains("send the books"));
        assert!(shown.contains("clear the books folder"));
    }
}
