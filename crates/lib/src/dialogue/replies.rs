//! Outbound message texts.

use super::input::MenuOption;
use crate::directory::Invoice;
use rust_decimal::Decimal;

/// Builds every customer-facing text. Holds the company name used in greetings.
#[derive(Debug, Clone)]
pub struct Replies {
    company: String,
}

impl Replies {
    pub fn new(company: impl Into<String>) -> Self {
        Self {
            company: company.into(),
        }
    }

    pub fn greeting(&self, name: &str) -> String {
        format!(
            "👋 Olá, {}!\n\nBem-vindo(a) ao atendimento da *{}*.\n\nComo posso ajudá-lo(a) hoje?",
            name, self.company
        )
    }

    pub fn request_tax_id(&self) -> String {
        format!(
            "👋 Olá! Bem-vindo(a) ao atendimento da *{}*.\n\nPara continuar, por favor me informe o *CNPJ* da sua empresa:",
            self.company
        )
    }

    pub fn invalid_tax_id(&self) -> String {
        "❌ CNPJ inválido. Por favor, digite um CNPJ válido com 14 números:".to_string()
    }

    pub fn tax_id_confirmed(&self, name: &str) -> String {
        format!("✅ Perfeito! Encontrei seu cadastro, {}.", name)
    }

    pub fn tax_id_not_found(&self) -> String {
        "❌ CNPJ não encontrado em nossa base de dados.\n\n\
         Confira o número e procure nossa equipe pelos canais oficiais de atendimento."
            .to_string()
    }

    pub fn main_menu(&self) -> String {
        let options: Vec<String> = MenuOption::ALL
            .iter()
            .map(|o| format!("{}\u{FE0F}\u{20E3} {}", o.digit(), o.label()))
            .collect();
        format!(
            "📋 *Menu de Opções*\n\nEscolha uma das opções abaixo digitando o número correspondente:\n\n{}",
            options.join("\n\n")
        )
    }

    pub fn invalid_option(&self) -> String {
        "❌ Opção inválida. Por favor, digite o número da opção desejada:".to_string()
    }

    pub fn back_or_exit(&self) -> String {
        "🔄 *Mais alguma coisa?*\n\nDigite *MENU* para voltar ao menu principal\nou *SAIR* para finalizar o atendimento."
            .to_string()
    }

    pub fn no_open_invoices(&self) -> String {
        "✅ Você não possui boletos em aberto no momento.".to_string()
    }

    pub fn invoice_summary(&self, count: usize) -> String {
        format!(
            "📄 *Boletos em Aberto*\n\nEncontrei {} boleto(s) em aberto:",
            count
        )
    }

    pub fn invoice(&self, invoice: &Invoice) -> String {
        let mut out = format!(
            "🧾 *Boleto #{}*\n📅 Vencimento: {}\n💰 Valor: {}\n\n🔢 Linha Digitável:\n{}",
            invoice.number,
            invoice.due_date.format("%d/%m/%Y"),
            format_brl(invoice.amount),
            invoice.typable_line
        );
        if !invoice.barcode.is_empty() {
            out.push_str("\n\n📊 Código de Barras:\n");
            out.push_str(&invoice.barcode);
        }
        if !invoice.payment_url.is_empty() {
            out.push_str("\n\n📎 Link:\n");
            out.push_str(&invoice.payment_url);
        }
        out
    }

    pub fn coming_soon(&self, option: MenuOption) -> String {
        let (icon, noun, pronoun) = match option {
            MenuOption::FiscalNotes => ("📋", "suas notas fiscais", "las"),
            MenuOption::Certificates => ("🏆", "seus certificados", "los"),
            _ => ("ℹ️", "esta opção", "la"),
        };
        format!(
            "{} *{}*\n\nEm breve disponibilizaremos {} por aqui.\nPara acessá-{} agora, entre em contato com nosso atendimento.",
            icon,
            option.label(),
            noun,
            pronoun
        )
    }

    pub fn handoff(&self) -> String {
        "👨‍💼 *Transferindo para Atendimento*\n\n\
         Sua solicitação será direcionada para um de nossos atendentes.\n\
         Aguarde que em breve alguém entrará em contato com você."
            .to_string()
    }

    pub fn goodbye(&self) -> String {
        format!(
            "👋 Atendimento finalizado. Obrigado por falar com a *{}*!",
            self.company
        )
    }

    pub fn not_understood(&self) -> String {
        "❓ Desculpe, não compreendi sua mensagem.\n\nDigite *MENU* para ver as opções disponíveis."
            .to_string()
    }

    pub fn temporary_failure(&self) -> String {
        "⚠️ Estamos com uma instabilidade no momento. Por favor, envie sua mensagem novamente em instantes."
            .to_string()
    }
}

/// Format as Brazilian currency: `R$ 1.234,56`.
pub fn format_brl(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let plain = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    format!("{}R$ {},{}", sign, grouped, frac_part)
}
