use anyhow::Result;
use inquire::{Confirm, Select, Text};

use indy_core::{Contact, ContactType};

/// Prompts the user for a new contact
pub fn prompt_new_contact() -> Result<Contact> {
    let first_name = Text::new("First name:").prompt()?;
    let last_name = Text::new("Last name:").prompt()?;

    let contact_type = Select::new("Type:", ContactType::ALL.to_vec()).prompt()?;
    let mut contact = Contact::new(first_name, last_name, contact_type);

    contact.email = Text::new("Email:").prompt()?;
    contact.phone = Text::new("Phone:").prompt()?;
    contact.organization = Text::new("Organization:").prompt()?;
    contact.notes = inquire::Editor::new("Notes:").prompt()?;

    Ok(contact)
}

/// Asks a yes/no question, defaulting to no
pub fn confirm(question: &str) -> Result<bool> {
    Ok(Confirm::new(question).with_default(false).prompt()?)
}
