// parser.rs
//
// Copyright 2026 Stéphane Cerveau <scerveau@igalia.com>
//
// This file is part of MiniGst
//
// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;

use crate::error::{MinigstError, Result};
use crate::launch::MAX_PIPELINE_DESCRIPTION_LENGTH;

/// One `factory [key=value]...` entry of a description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDescription {
    pub factory: String,
    pub name: String,
    /// Properties other than `name`, in the order given.
    pub properties: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Link,
}

fn tokenize(description: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    let flush = |current: &mut String, tokens: &mut Vec<Token>| {
        if !current.is_empty() {
            tokens.push(Token::Word(std::mem::take(current)));
        }
    };

    for c in description.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '!' if !in_quotes => {
                flush(&mut current, &mut tokens);
                tokens.push(Token::Link);
            }
            c if c.is_whitespace() && !in_quotes => flush(&mut current, &mut tokens),
            c => current.push(c),
        }
    }

    if in_quotes {
        return Err(MinigstError::InvalidPipeline(
            "Unterminated quoted value".to_string(),
        ));
    }
    flush(&mut current, &mut tokens);
    Ok(tokens)
}

/// Split a description into element entries, validating its shape.
pub fn parse_description(description: &str) -> Result<Vec<ElementDescription>> {
    if description.trim().is_empty() {
        return Err(MinigstError::InvalidPipeline(
            "Pipeline description cannot be empty".to_string(),
        ));
    }
    if description.len() > MAX_PIPELINE_DESCRIPTION_LENGTH {
        return Err(MinigstError::InvalidPipeline(format!(
            "Pipeline description too long: {} bytes (max: {} bytes)",
            description.len(),
            MAX_PIPELINE_DESCRIPTION_LENGTH
        )));
    }

    let mut groups: Vec<Vec<String>> = vec![Vec::new()];
    for token in tokenize(description)? {
        match token {
            Token::Word(word) => {
                if let Some(group) = groups.last_mut() {
                    group.push(word);
                }
            }
            Token::Link => groups.push(Vec::new()),
        }
    }

    let mut factory_counts: HashMap<String, usize> = HashMap::new();
    let mut elements = Vec::with_capacity(groups.len());

    for (position, group) in groups.into_iter().enumerate() {
        let mut words = group.into_iter();
        let Some(factory) = words.next() else {
            return Err(MinigstError::InvalidPipeline(format!(
                "Missing element around link {}",
                position
            )));
        };
        if factory.contains('=') {
            return Err(MinigstError::InvalidPipeline(format!(
                "Expected an element factory, found '{}'",
                factory
            )));
        }

        let index = factory_counts.entry(factory.clone()).or_insert(0);
        let mut name = format!("{}{}", factory, index);
        *index += 1;

        let mut properties = Vec::new();
        for word in words {
            let Some((key, value)) = word.split_once('=') else {
                return Err(MinigstError::InvalidPipeline(format!(
                    "Expected key=value after '{}', found '{}'",
                    factory, word
                )));
            };
            if key.is_empty() {
                return Err(MinigstError::InvalidPipeline(format!(
                    "Empty property name in '{}'",
                    word
                )));
            }
            if key == "name" {
                if value.is_empty() {
                    return Err(MinigstError::InvalidPipeline(format!(
                        "Empty name for '{}'",
                        factory
                    )));
                }
                name = value.to_string();
            } else {
                properties.push((key.to_string(), value.to_string()));
            }
        }

        elements.push(ElementDescription {
            factory,
            name,
            properties,
        });
    }

    Ok(elements)
}
