//! Prompt construction for the evaluation chain
//!
//! Each stage embeds the job title, retrieved reference context and the
//! candidate's material, and pins the exact output shape the parser
//! expects.

pub const CV_SYSTEM: &str = "You are an experienced technical recruiter evaluating a candidate's CV \
against a specific role. Ground every judgement in the provided job requirements and scoring \
rubric. Respond with a single JSON object and nothing else.";

pub const PROJECT_SYSTEM: &str = "You are a senior engineer reviewing a candidate's project report \
for a specific role. Ground every judgement in the provided technical requirements and scoring \
rubric. Respond with a single JSON object and nothing else.";

pub const OVERALL_SYSTEM: &str = "You are a hiring committee member writing the final evaluation \
for a candidate. Be direct and specific.";

fn context_block(title: &str, content: &str) -> String {
    if content.trim().is_empty() {
        format!("{}:\n(no reference material available)\n", title)
    } else {
        format!("{}:\n{}\n", title, content.trim())
    }
}

/// Prompt for the CV scoring stage
pub fn cv_prompt(job_title: &str, requirements: &str, rubric: &str, cv_text: &str) -> String {
    let mut prompt = format!("Evaluate the following CV for the role of \"{}\".\n\n", job_title);
    prompt.push_str(&context_block("Job requirements", requirements));
    prompt.push('\n');
    prompt.push_str(&context_block("Scoring rubric", rubric));
    prompt.push_str(&format!("\nCandidate CV:\n{}\n", cv_text.trim()));
    prompt.push_str(
        "\nReturn a JSON object with exactly these fields:\n\
         {\n\
           \"matchRate\": <number 0.0-1.0, overall fit against the requirements>,\n\
           \"experienceMatch\": <number 0.0-1.0, seniority and years of experience fit>,\n\
           \"strengths\": [<strings>],\n\
           \"weaknesses\": [<strings>],\n\
           \"missingSkills\": [<strings>],\n\
           \"overallAssessment\": <string, 2-4 sentences>\n\
         }",
    );
    prompt
}

/// Prompt for the project scoring stage
pub fn project_prompt(
    job_title: &str,
    tech_requirements: &str,
    rubric: &str,
    project_text: &str,
) -> String {
    let mut prompt = format!(
        "Evaluate the following project report from a candidate for the role of \"{}\".\n\n",
        job_title
    );
    prompt.push_str(&context_block("Technical requirements", tech_requirements));
    prompt.push('\n');
    prompt.push_str(&context_block("Scoring rubric", rubric));
    prompt.push_str(&format!("\nProject report:\n{}\n", project_text.trim()));
    prompt.push_str(
        "\nReturn a JSON object with exactly these fields, all scores on a 1.0-5.0 scale:\n\
         {\n\
           \"overallScore\": <number>,\n\
           \"technicalQuality\": <number>,\n\
           \"complexityLevel\": <number>,\n\
           \"innovationScore\": <number>,\n\
           \"documentationQuality\": <number>,\n\
           \"strengths\": [<strings>],\n\
           \"improvements\": [<strings>]\n\
         }",
    );
    prompt
}

/// Prompt for the final recommendation stage
pub fn overall_prompt(job_title: &str, cv_summary: &str, project_summary: &str) -> String {
    format!(
        "A candidate applied for the role of \"{}\". Two assessments were produced.\n\n\
         CV assessment:\n{}\n\n\
         Project assessment:\n{}\n\n\
         Write the final evaluation in exactly this format:\n\
         RECOMMENDATION: <one of HIRE, CONDITIONAL_HIRE, REJECT>\n\
         DETAILED FEEDBACK: <2-4 paragraphs covering both assessments>\n\
         SPECIFIC RECOMMENDATIONS: <numbered list of concrete next steps>",
        job_title, cv_summary, project_summary
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cv_prompt_embeds_inputs() {
        let prompt = cv_prompt("Backend Engineer", "Rust required", "Score by skills", "My CV");
        assert!(prompt.contains("Backend Engineer"));
        assert!(prompt.contains("Rust required"));
        assert!(prompt.contains("Score by skills"));
        assert!(prompt.contains("My CV"));
        assert!(prompt.contains("matchRate"));
    }

    #[test]
    fn test_empty_context_is_marked() {
        let prompt = cv_prompt("Backend Engineer", "", "", "My CV");
        assert!(prompt.contains("(no reference material available)"));
    }

    #[test]
    fn test_overall_prompt_pins_headers() {
        let prompt = overall_prompt("Backend Engineer", "good cv", "good project");
        assert!(prompt.contains("RECOMMENDATION:"));
        assert!(prompt.contains("DETAILED FEEDBACK:"));
        assert!(prompt.contains("SPECIFIC RECOMMENDATIONS:"));
    }
}
