//! Prompt construction for proposal, reflection, value, summary and judge calls.
//!
//! [`PromptBuilder`] is the seam; [`DefaultPrompts`] picks a template variant by
//! backend family and language.

use crate::config::{BackendFamily, Language};

/// Inputs shared by proposal and reflection prompts.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub question: &'a str,
    pub trajectory: &'a str,
    pub step_index: usize,
    pub language: Language,
    pub family: BackendFamily,
}

/// Produces prompt strings. No behavior contract beyond returning a string.
pub trait PromptBuilder: Send + Sync {
    fn propose(&self, ctx: &PromptContext<'_>) -> String;
    fn propose_with_reflection(&self, ctx: &PromptContext<'_>, reflection: &str) -> String;
    fn reflection_short(&self, ctx: &PromptContext<'_>) -> String;
    fn reflection_long(&self, ctx: &PromptContext<'_>) -> String;
    fn value(&self, question: &str, trajectory: &str) -> String;
    fn summary(&self, question: &str, trajectory: &str) -> String;
    fn judge(&self, summary: &str, ground_truth: &str) -> String;
}

const PROPOSE_EN: &str = r#"Given a science or math problem and an existing partial solution (not a complete answer), output exactly ONE next step that continues the solution. If the existing steps are empty, output the first step. Answer in the format "Next step: <content>"."#;

const PROPOSE_ZH: &str = r#"给定一个科学或数学问题和已有的部分解答（不是完整答案），输出恰好一个继续解答的下一步。如果已有步骤为空，输出第一步。请使用格式 "Next step: <内容>" 作答。"#;

const PROPOSE_GPT_EN: &str = r#"You are solving a problem step by step. Read the problem and the existing steps, then write ONLY the next step. Do not repeat earlier steps and do not give more than one step. Reply as "Next step: <content>"."#;

const PROPOSE_MISTRAL: &str = r#"[INST] Continue the solution below with exactly one new step. Write it as "Step N: <content>" where N is the step number given. [/INST]"#;

const PROPOSE_REFLECTION_EN: &str = r#"Given a problem, an existing partial solution and an analysis of that solution, output exactly ONE next step that follows the analysis. Answer in the format "Next step: <content>"."#;

const PROPOSE_REFLECTION_GPT_EN: &str = r#"You are solving a problem step by step. A reviewer analysed the existing steps. Use the analysis to write ONLY the next step, formatted as "Next step: <content>"."#;

const PROPOSE_REFLECTION_ZH: &str = r#"给定问题、已有的部分解答以及对该解答的分析，输出恰好一个遵循分析的下一步，格式为 "Next step: <内容>"。"#;

const REFLECT_SHORT_EN: &str = r#"Given a problem and a partial solution, decide whether the solution already reaches a final answer. Reply with "Problem solved" if it does, otherwise "Problem unsolved"."#;

const REFLECT_SHORT_ZH: &str = r#"给定问题和部分解答，判断解答是否已经得出最终答案。如果是，回复 "Problem solved"，否则回复 "Problem unsolved"。"#;

const REFLECT_SHORT_MISTRAL: &str = r#"[INST] Has the solution below reached the final answer of the problem? Answer only "solved" or "unsolved". [/INST]"#;

const REFLECT_LONG_EN: &str = r#"Given a problem and a partial solution, check the existing steps. If the final answer is already reached and correct, reply "Problem solved". Otherwise reply "Analysis: <what is wrong or what should come next>"."#;

const REFLECT_LONG_ZH: &str = r#"给定问题和部分解答，检查已有步骤。如果已经得出正确的最终答案，回复 "Problem solved"；否则回复 "Analysis: <存在的问题或下一步方向>"。"#;

const VALUE_TEMPLATE: &str = r#"Evaluate how likely the partial solution below leads to a correct final answer. Output a single line "Score: <number between 0 and 1>"."#;

const SUMMARY_TEMPLATE: &str = r#"Given a math problem and its solution steps, state the final answer in one sentence ending with "The final answer is \boxed{<answer>}"."#;

const JUDGE_TEMPLATE: &str = r#"Decide whether the candidate answer is mathematically equivalent to the reference answer. Reply with only "yes" or "no"."#;

const CASE_EXAMPLE: &str = r#"Example:
Problem: Compute 12 * 15.
Existing steps:
Step 1: 12 * 15 = 12 * 10 + 12 * 5.
Output: Next step: 12 * 10 + 12 * 5 = 120 + 60 = 180, so the answer is 180.
"#;

/// Template-based prompt builder.
#[derive(Debug, Clone, Default)]
pub struct DefaultPrompts {
    /// Prepend a worked example to proposal prompts.
    use_case_prompt: bool,
}

impl DefaultPrompts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_case_prompt(mut self, enable: bool) -> Self {
        self.use_case_prompt = enable;
        self
    }

    fn steps_or_none(trajectory: &str, language: Language) -> &str {
        if !trajectory.trim().is_empty() {
            return trajectory;
        }
        match language {
            Language::En => "None\n",
            Language::Zh => "无\n",
        }
    }

    fn body(instruction: &str, ctx: &PromptContext<'_>) -> String {
        format!(
            "{}\n\nProblem: {}\nExisting steps:\n{}Step number: {}\nOutput:",
            instruction.trim(),
            ctx.question,
            Self::steps_or_none(ctx.trajectory, ctx.language),
            ctx.step_index
        )
    }
}

impl PromptBuilder for DefaultPrompts {
    fn propose(&self, ctx: &PromptContext<'_>) -> String {
        let instruction = match (ctx.family, ctx.language) {
            (BackendFamily::Mistral | BackendFamily::Llama, _) => PROPOSE_MISTRAL,
            (BackendFamily::Gpt, Language::En) => PROPOSE_GPT_EN,
            (BackendFamily::Gpt | BackendFamily::Glm | BackendFamily::Local, Language::Zh) => {
                PROPOSE_ZH
            }
            (BackendFamily::Glm | BackendFamily::Local, Language::En) => PROPOSE_EN,
        };
        let prompt = Self::body(instruction, ctx);
        if self.use_case_prompt {
            format!("{}\n{}", CASE_EXAMPLE, prompt)
        } else {
            prompt
        }
    }

    fn propose_with_reflection(&self, ctx: &PromptContext<'_>, reflection: &str) -> String {
        let instruction = match (ctx.family, ctx.language) {
            (_, Language::Zh) => PROPOSE_REFLECTION_ZH,
            (BackendFamily::Gpt | BackendFamily::Local, Language::En) => PROPOSE_REFLECTION_GPT_EN,
            (BackendFamily::Glm | BackendFamily::Mistral | BackendFamily::Llama, Language::En) => {
                PROPOSE_REFLECTION_EN
            }
        };
        format!("{}\nAnalysis: {}", Self::body(instruction, ctx), reflection.trim())
    }

    fn reflection_short(&self, ctx: &PromptContext<'_>) -> String {
        let instruction = match (ctx.family, ctx.language) {
            (BackendFamily::Mistral, _) => REFLECT_SHORT_MISTRAL,
            (_, Language::Zh) => REFLECT_SHORT_ZH,
            (_, Language::En) => REFLECT_SHORT_EN,
        };
        Self::body(instruction, ctx)
    }

    fn reflection_long(&self, ctx: &PromptContext<'_>) -> String {
        let instruction = match ctx.language {
            Language::En => REFLECT_LONG_EN,
            Language::Zh => REFLECT_LONG_ZH,
        };
        Self::body(instruction, ctx)
    }

    fn value(&self, question: &str, trajectory: &str) -> String {
        format!(
            "{}\n\nProblem: {}\nSolution:\n{}Score:",
            VALUE_TEMPLATE, question, trajectory
        )
    }

    fn summary(&self, question: &str, trajectory: &str) -> String {
        format!(
            "{}\n\nProblem: {}\nSolution:\n{}Summary:",
            SUMMARY_TEMPLATE, question, trajectory
        )
    }

    fn judge(&self, summary: &str, ground_truth: &str) -> String {
        format!(
            "{}\n\nCandidate: {}\nReference: {}\nEquivalent:",
            JUDGE_TEMPLATE, summary, ground_truth
        )
    }
}
