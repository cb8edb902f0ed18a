mod support;

mod membership;
