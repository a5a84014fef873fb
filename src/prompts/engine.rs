use tera::Tera;

/// Tera-backed template engine with the prompt templates pre-registered.
pub struct PromptEngine {
    tera: Tera,
}

impl PromptEngine {
    pub fn new(templates: &[(&str, &str)]) -> anyhow::Result<Self> {
        let mut tera = Tera::default();
        for (name, content) in templates {
            tera.add_raw_template(name, content)?;
        }
        Ok(Self { tera })
    }

    /// Render a named template with the given context.
    pub fn render(&self, template_name: &str, context: &tera::Context) -> anyhow::Result<String> {
        let rendered = self.tera.render(template_name, context)?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tera::Context;

    #[test]
    fn registers_and_renders() {
        let engine = PromptEngine::new(&[("greeting", "Hello, {{ name }}!")]).unwrap();

        let mut ctx = Context::new();
        ctx.insert("name", "World");

        assert_eq!(engine.render("greeting", &ctx).unwrap(), "Hello, World!");
    }

    #[test]
    fn unknown_template_fails() {
        let engine = PromptEngine::new(&[]).unwrap();
        assert!(engine.render("missing", &Context::new()).is_err());
    }

    #[test]
    fn conditional_sections_render() {
        let engine =
            PromptEngine::new(&[("cond", "{% if extra %}extra: {{ extra }}{% endif %}")]).unwrap();

        let mut ctx = Context::new();
        ctx.insert("extra", "context");
        assert_eq!(engine.render("cond", &ctx).unwrap(), "extra: context");

        let mut empty = Context::new();
        empty.insert("extra", &false);
        assert_eq!(engine.render("cond", &empty).unwrap(), "");
    }
}
