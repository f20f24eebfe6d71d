use crate::models::{
    BookForm, BookPatch, BookStatus, DEFAULT_DESCRIPTION, FieldErrors, IMAGE_PLACEHOLDER, NewBook,
    SignupForm,
};

const TITLE_REQUIRED: &str = "Title is required.";
const AUTHOR_REQUIRED: &str = "Author is required.";
const INVALID_STATUS: &str = "Invalid status. Allowed values: to-read, reading, read.";
const EMAIL_REQUIRED: &str = "Email is required.";
const PASSWORD_REQUIRED: &str = "Password is required.";
const PASSWORD_MISMATCH: &str = "Passwords do not match.";
const NOTE_EMPTY: &str = "Note cannot be empty";

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Optional text fields count as absent when blank.
fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

fn parse_status(value: Option<&str>) -> Option<BookStatus> {
    value.and_then(|v| v.parse().ok())
}

/// Checks every field of a full book submission independently.
pub fn check_book(form: &BookForm) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if is_blank(form.title.as_deref()) {
        errors.insert("title", TITLE_REQUIRED);
    }
    if is_blank(form.author.as_deref()) {
        errors.insert("author", AUTHOR_REQUIRED);
    }
    if parse_status(form.status.as_deref()).is_none() {
        errors.insert("status", INVALID_STATUS);
    }

    errors
}

pub fn validate_new_book(form: &BookForm) -> Result<NewBook, FieldErrors> {
    match (
        non_blank(&form.title),
        non_blank(&form.author),
        parse_status(form.status.as_deref()),
    ) {
        (Some(title), Some(author), Some(status)) => Ok(NewBook {
            title,
            author,
            status,
            image: non_blank(&form.image).unwrap_or_else(|| IMAGE_PLACEHOLDER.to_string()),
            description: non_blank(&form.description)
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        }),
        _ => Err(check_book(form)),
    }
}

/// Validates only the fields that were submitted.
pub fn validate_book_patch(form: &BookForm) -> Result<BookPatch, FieldErrors> {
    let mut errors = FieldErrors::new();

    if form.title.is_some() && is_blank(form.title.as_deref()) {
        errors.insert("title", TITLE_REQUIRED);
    }
    if form.author.is_some() && is_blank(form.author.as_deref()) {
        errors.insert("author", AUTHOR_REQUIRED);
    }
    let status = match form.status.as_deref() {
        None => None,
        Some(raw) => match raw.parse::<BookStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                errors.insert("status", INVALID_STATUS);
                None
            }
        },
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(BookPatch {
        title: non_blank(&form.title),
        author: non_blank(&form.author),
        status,
        image: non_blank(&form.image),
        description: non_blank(&form.description),
    })
}

pub fn check_signup(form: &SignupForm) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if is_blank(form.email.as_deref()) {
        errors.insert("email", EMAIL_REQUIRED);
    }
    if is_blank(form.password.as_deref()) {
        errors.insert("password", PASSWORD_REQUIRED);
    }
    if form.password != form.confirm_password {
        errors.insert("confirmPassword", PASSWORD_MISMATCH);
    }

    errors
}

pub fn validate_note(note: Option<&str>) -> Result<String, FieldErrors> {
    match note {
        Some(note) if !note.trim().is_empty() => Ok(note.to_string()),
        _ => Err(FieldErrors::single("note", NOTE_EMPTY)),
    }
}
