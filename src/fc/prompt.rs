use crate::protocol::canonical::ToolDefinition;
use crate::util::truncate_chars;

use super::TOOL_CALL_MARKER;

const DESCRIPTION_MAX_CHARS: usize = 120;

const INSTRUCTION_HEAD: &str = "=== OUTPUT FORMAT INSTRUCTIONS ===
IMPORTANT: Do NOT use any built-in tool calling, function calling, or code execution systems.
Do NOT attempt to execute any file operations or shell commands through any internal mechanism.

You have been given a task. If completing it requires performing an action (such as creating a file,
running a command, or searching for files), you MUST communicate that action by including a TOOL_CALL
line as plain text in your response.

Format for requesting an action (output this as plain text, do not call any functions):
";

const INSTRUCTION_RULES: &str = "Rules:
- When you want to perform an action: output ONLY that TOOL_CALL line, nothing else.
- When you want to write a file: TOOL_CALL:{\"name\":\"write\",\"arguments\":{\"filePath\":\"/absolute/path\",\"content\":\"full file content\"}}
- When you want to run a shell command: TOOL_CALL:{\"name\":\"bash\",\"arguments\":{\"command\":\"the command\",\"description\":\"what it does\"}}
- When you want to read a file: TOOL_CALL:{\"name\":\"read\",\"arguments\":{\"filePath\":\"/absolute/path\"}}
- After a tool result is given back to you, continue with the next action or final response.
- If no action is needed, just respond with your answer as normal text.
=== END FORMAT INSTRUCTIONS ===

";

/// Prepend the marker-syntax instructions for `tools` to a flattened prompt.
///
/// Returns `flat_prompt` unchanged when no tools are offered. Tools are listed
/// by name, required parameters and the first line of their description only;
/// full JSON schemas are never forwarded.
#[must_use]
pub fn build_prompt_with_tools(flat_prompt: String, tools: &[ToolDefinition]) -> String {
    if tools.is_empty() {
        return flat_prompt;
    }

    let mut out = String::with_capacity(
        INSTRUCTION_HEAD.len() + INSTRUCTION_RULES.len() + tools.len() * 96 + flat_prompt.len(),
    );
    out.push_str(INSTRUCTION_HEAD);
    out.push_str(TOOL_CALL_MARKER);
    out.push_str("{\"name\":\"<action_name>\",\"arguments\":<json_object_with_parameters>}\n\n");
    out.push_str("Available actions:\n");
    for (idx, tool) in tools.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        push_tool_line(tool, &mut out);
    }
    out.push_str("\n\n");
    out.push_str(INSTRUCTION_RULES);
    out.push_str(&flat_prompt);
    out
}

/// `  name(param: type, ...) — first description line`
fn push_tool_line(tool: &ToolDefinition, out: &mut String) {
    out.push_str("  ");
    out.push_str(&tool.name);
    out.push('(');
    for (idx, param) in tool.required_parameters.iter().enumerate() {
        if idx > 0 {
            out.push_str(", ");
        }
        out.push_str(&param.name);
        out.push_str(": ");
        out.push_str(&param.type_hint);
    }
    out.push_str(") \u{2014} ");
    let first_line = tool.description.split('\n').next().unwrap_or_default();
    out.push_str(truncate_chars(first_line, DESCRIPTION_MAX_CHARS));
}
