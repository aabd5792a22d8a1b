use anyhow::Result;
use dialoguer::{Input, Password, Select};

pub fn prompt_value(prompt: &str) -> Result<String> {
    let value = Input::<String>::new().with_prompt(prompt).interact_text()?;
    Ok(value.trim().to_string())
}

/// Hidden input for passwords and API tokens
pub fn prompt_secret(prompt: &str) -> Result<String> {
    let value = Password::new().with_prompt(prompt).interact()?;
    Ok(value)
}

/// Yes/No selection; `Ok(true)` for "Yes"
pub fn prompt_confirmation(prompt: &str, default_yes: bool) -> Result<bool> {
    let items = vec!["Yes", "No"];
    let default_index = if default_yes { 0 } else { 1 };

    let selection = Select::new()
        .with_prompt(prompt)
        .items(&items)
        .default(default_index)
        .interact()?;

    Ok(selection == 0)
}

pub fn prompt_overwrite_confirmation(path: &str) -> Result<bool> {
    prompt_confirmation(&format!("'{}' already exists. Overwrite?", path), false)
}
