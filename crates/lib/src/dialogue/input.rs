//! Input classification: what an inbound text means in the current state.

use crate::identity;
use crate::session::ConversationState;

/// Main menu entries, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuOption {
    Invoices,
    FiscalNotes,
    Certificates,
    Proposals,
    Attendant,
}

impl MenuOption {
    pub const ALL: [MenuOption; 5] = [
        MenuOption::Invoices,
        MenuOption::FiscalNotes,
        MenuOption::Certificates,
        MenuOption::Proposals,
        MenuOption::Attendant,
    ];

    pub fn from_digit(d: char) -> Option<Self> {
        match d {
            '1' => Some(MenuOption::Invoices),
            '2' => Some(MenuOption::FiscalNotes),
            '3' => Some(MenuOption::Certificates),
            '4' => Some(MenuOption::Proposals),
            '5' => Some(MenuOption::Attendant),
            _ => None,
        }
    }

    pub fn digit(self) -> char {
        match self {
            MenuOption::Invoices => '1',
            MenuOption::FiscalNotes => '2',
            MenuOption::Certificates => '3',
            MenuOption::Proposals => '4',
            MenuOption::Attendant => '5',
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MenuOption::Invoices => "Boletos em Aberto",
            MenuOption::FiscalNotes => "Notas Fiscais",
            MenuOption::Certificates => "Certificados",
            MenuOption::Proposals => "Propostas Comerciais",
            MenuOption::Attendant => "Falar com Atendente",
        }
    }
}

/// Normalized input class; the engine dispatches on (state, input).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// First processed message of a session. Carries the digits when they form a tax id.
    Opening { tax_id: Option<String> },
    /// Exactly 14 digits after stripping punctuation.
    TaxId(String),
    BadTaxId,
    Menu(MenuOption),
    /// "MENU": show the menu again.
    ShowMenu,
    /// "SAIR": end the conversation.
    Exit,
    InvalidOption,
    Unrecognized,
}

const SHOW_MENU_WORDS: &[&str] = &["menu", "voltar"];
const EXIT_WORDS: &[&str] = &["sair", "exit", "encerrar"];

/// Keycap glyph parts that may follow a menu digit (e.g. "1️⃣").
const KEYCAP_GLYPHS: &[char] = &['\u{FE0F}', '\u{20E3}'];

pub fn classify(state: ConversationState, text: &str) -> Input {
    match state {
        ConversationState::Start => {
            let digits = identity::digits(text);
            Input::Opening {
                tax_id: (digits.len() == identity::TAX_ID_LEN).then_some(digits),
            }
        }
        ConversationState::AwaitingTaxId => {
            let digits = identity::digits(text);
            if digits.len() == identity::TAX_ID_LEN {
                Input::TaxId(digits)
            } else {
                Input::BadTaxId
            }
        }
        ConversationState::MainMenu => classify_menu(text),
        ConversationState::Finished => Input::Unrecognized,
    }
}

fn classify_menu(text: &str) -> Input {
    let trimmed = text.trim();
    if let Some(option) = parse_menu_option(trimmed) {
        return Input::Menu(option);
    }
    let word = trimmed.to_lowercase();
    if SHOW_MENU_WORDS.contains(&word.as_str()) {
        Input::ShowMenu
    } else if EXIT_WORDS.contains(&word.as_str()) {
        Input::Exit
    } else {
        Input::InvalidOption
    }
}

/// A bare digit, or the digit immediately followed only by keycap glyph parts.
fn parse_menu_option(text: &str) -> Option<MenuOption> {
    let mut chars = text.chars();
    let first = chars.next()?;
    if !chars.all(|c| KEYCAP_GLYPHS.contains(&c)) {
        return None;
    }
    MenuOption::from_digit(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_detects_tax_id_in_first_message() {
        assert_eq!(
            classify(ConversationState::Start, "12.345.678/0001-99"),
            Input::Opening {
                tax_id: Some("12345678000199".into())
            }
        );
        assert_eq!(
            classify(ConversationState::Start, "bom dia"),
            Input::Opening { tax_id: None }
        );
    }

    #[test]
    fn awaiting_tax_id_requires_fourteen_digits() {
        assert_eq!(
            classify(ConversationState::AwaitingTaxId, "12345678000199"),
            Input::TaxId("12345678000199".into())
        );
        assert_eq!(
            classify(ConversationState::AwaitingTaxId, "1234"),
            Input::BadTaxId
        );
    }

    #[test]
    fn menu_accepts_digit_and_keycap_forms() {
        assert_eq!(
            classify(ConversationState::MainMenu, " 1 "),
            Input::Menu(MenuOption::Invoices)
        );
        assert_eq!(
            classify(ConversationState::MainMenu, "2\u{FE0F}\u{20E3}"),
            Input::Menu(MenuOption::FiscalNotes)
        );
        assert_eq!(
            classify(ConversationState::MainMenu, "5⃣"),
            Input::Menu(MenuOption::Attendant)
        );
        assert_eq!(
            classify(ConversationState::MainMenu, "9"),
            Input::InvalidOption
        );
        assert_eq!(
            classify(ConversationState::MainMenu, "12"),
            Input::InvalidOption
        );
        assert_eq!(
            classify(ConversationState::MainMenu, "1 boleto"),
            Input::InvalidOption
        );
    }

    #[test]
    fn menu_keywords() {
        assert_eq!(classify(ConversationState::MainMenu, "MENU"), Input::ShowMenu);
        assert_eq!(classify(ConversationState::MainMenu, "Sair"), Input::Exit);
    }

    #[test]
    fn finished_ignores_everything() {
        for text in ["1", "menu", "12345678000199"] {
            assert_eq!(classify(ConversationState::Finished, text), Input::Unrecognized);
        }
    }

    #[test]
    fn option_digits_round_trip() {
        for option in MenuOption::ALL {
            assert_eq!(MenuOption::from_digit(option.digit()), Some(option));
        }
    }
}
