//! Prompt templates for every generation stage.
//!
//! Templates are plain functions so each stage's inputs are explicit.

pub fn simple_system(context: &str) -> String {
    format!(
        "You are a helpful assistant. Use the following context to answer the user's question. \
         If the answer is not in the context, say so.\n\nCONTEXT:\n{context}"
    )
}

pub fn provocateur(question: &str, context: &str) -> String {
    format!(
        "You are the PROVOCATEUR. Your role is to be creative, expansive, and think outside the box.\n\
         User Question: {question}\n\
         Context: {context}\n\n\
         Task:\n\
         1. Generate a comprehensive and detailed draft answer.\n\
         2. Explore unconventional angles or creative possibilities if relevant.\n\
         3. Do not worry about being overly concise; focus on richness and depth.\n"
    )
}

pub fn critic(draft: &str, context: &str) -> String {
    format!(
        "You are the CRITIC. Your role is to be a strict auditor and fact-checker.\n\
         Draft Answer: {draft}\n\
         Original Context: {context}\n\n\
         Task:\n\
         1. Identify any logical errors, factual inaccuracies, or hallucinations in the draft.\n\
         2. Compare the draft strictly against the provided Context.\n\
         3. Be brief and direct. List the errors. If no errors, state \"No critical errors found.\"\n"
    )
}

pub fn synthesizer(question: &str, draft: &str, critique: &str) -> String {
    format!(
        "You are the SYNTHESIZER. Your role is to create the perfect final response.\n\
         Original Question: {question}\n\
         Creative Draft: {draft}\n\
         Critic's Feedback: {critique}\n\n\
         Task:\n\
         1. Rewrite the Draft incorporating the Critic's feedback.\n\
         2. Remove any hallucinations or errors pointed out.\n\
         3. Keep the creative tone of the Draft but ensure accuracy.\n\
         4. Output ONLY the final improved response.\n"
    )
}

pub fn decomposition(question: &str) -> String {
    format!(
        "Question: {question}\n\n\
         Task: Break this question into 3-4 sub-questions or reasoning steps that together \
         lead to a complete answer. List them as a numbered plan. Do NOT answer them.\n"
    )
}

/// Retrieval text for the deep-reasoning pipeline: the question followed by its plan.
pub fn augmented_query(question: &str, plan: &str) -> String {
    format!("{question}\n{plan}")
}

pub fn hypothesis(question: &str, context: &str, plan: Option<&str>) -> String {
    let plan = plan.map(|p| format!("Reasoning Plan:\n{p}\n\n")).unwrap_or_default();
    format!(
        "Question: {question}\n\n\
         {plan}Retrieved Context:\n{context}\n\n\
         Task: Write your best answer to the Question using the Retrieved Context.\n"
    )
}

pub fn critique(question: &str, context: &str, hypothesis: &str) -> String {
    format!(
        "Original Question: {question}\n\
         Retrieved Context:\n{context}\n\n\
         Proposed Answer:\n{hypothesis}\n\n\
         Task: Identify any factual errors, unsupported claims, or omissions in the Proposed Answer \
         when checked against the Retrieved Context. If the answer is fully correct and complete, \
         reply with the single word PASS.\n"
    )
}

pub fn refinement(question: &str, context: &str, hypothesis: &str, critique: &str) -> String {
    format!(
        "Original Question: {question}\n\
         Retrieved Context:\n{context}\n\n\
         Previous Answer:\n{hypothesis}\n\n\
         Reviewer Feedback:\n{critique}\n\n\
         Task: Rewrite the answer so that it fixes every issue raised in the feedback. \
         Output ONLY the corrected answer.\n"
    )
}

pub fn vote(question: &str, context: &str) -> String {
    format!("Question: {question}\nContext: {context}\nAnswer:")
}

pub fn aggregator(question: &str, votes: &[(String, String)]) -> String {
    let mut prompt = format!("Question: {question}\n\nHere are proposed answers from different agents:\n");
    for (model, answer) in votes {
        prompt.push_str(&format!("[{model}]: {answer}\n\n"));
    }
    prompt.push_str("Task: Synthesize a final, single best answer that incorporates the consensus view.");
    prompt
}
